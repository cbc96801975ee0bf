//! Per-client rate limiting.
//!
//! Each client IP owns a token bucket holding `rate_limit_max` tokens that
//! refills continuously over `rate_limit_window_secs`. A request spends one
//! token; an empty bucket yields a 429 envelope.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::SecurityConfig;
use crate::http::error::ApiError;

/// Bucket count above which idle, full buckets are first dropped.
const PRUNE_THRESHOLD: usize = 10_000;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        self.refill(capacity, refill_rate, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token buckets keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<Option<IpAddr>, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
    base_threshold: usize,
    /// Bucket count that triggers the next prune: twice the count that
    /// survived the last one, never below `base_threshold`.
    prune_at: AtomicUsize,
    prunes: AtomicU64,
}

impl RateLimiter {
    /// Allow `max` requests per `window` per client.
    pub fn new(max: u32, window: Duration) -> Self {
        Self::with_prune_threshold(max, window, PRUNE_THRESHOLD)
    }

    fn with_prune_threshold(max: u32, window: Duration, threshold: usize) -> Self {
        let capacity = f64::from(max.max(1));
        let window = window.as_secs_f64().max(f64::EPSILON);
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate: capacity / window,
            base_threshold: threshold,
            prune_at: AtomicUsize::new(threshold),
            prunes: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(
            config.rate_limit_max,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Spend one token for `client`. Clients without a known address share a bucket.
    pub fn check(&self, client: Option<IpAddr>) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: Option<IpAddr>, now: Instant) -> bool {
        if self.buckets.len() > self.prune_at.load(Ordering::Relaxed) {
            self.prune(now);
        }
        let mut bucket = self
            .buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.capacity, now));
        bucket.try_acquire(self.capacity, self.refill_rate, now)
    }

    /// Drop buckets that have refilled completely; they hold no state.
    fn prune(&self, now: Instant) {
        let (capacity, rate) = (self.capacity, self.refill_rate);
        self.buckets.retain(|_, bucket| {
            bucket.refill(capacity, rate, now);
            bucket.tokens < capacity
        });

        let remaining = self.buckets.len();
        let next = remaining.saturating_mul(2).max(self.base_threshold);
        self.prune_at.store(next, Ordering::Relaxed);
        let runs = self.prunes.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(remaining, next_prune_at = next, runs, "Pruned rate limit buckets");
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Number of prune scans run so far.
    pub fn prune_runs(&self) -> u64 {
        self.prunes.load(Ordering::Relaxed)
    }
}

/// Middleware function for per-IP rate limiting.
pub async fn rate_limit(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if limiter.check(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = ?client, "Rate limit exceeded");
        ApiError::TooManyRequests.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn ip(last: u8) -> Option<IpAddr> {
        Some(IpAddr::from([10, 0, 0, last]))
    }

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(900));
        let now = Instant::now();
        assert!(limiter.check_at(ip(1), now));
        assert!(limiter.check_at(ip(1), now));
        assert!(limiter.check_at(ip(1), now));
        assert!(!limiter.check_at(ip(1), now));

        // Other clients are unaffected.
        assert!(limiter.check_at(ip(2), now));
    }

    #[test]
    fn tokens_refill_over_the_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check_at(ip(1), start));
        assert!(limiter.check_at(ip(1), start));
        assert!(!limiter.check_at(ip(1), start));

        // 2 tokens per 10 s: one token back after 5 s.
        assert!(limiter.check_at(ip(1), start + Duration::from_secs(5)));
        assert!(!limiter.check_at(ip(1), start + Duration::from_secs(5)));
    }

    #[test]
    fn prune_drops_only_full_buckets() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at(ip(1), start);
        limiter.check_at(ip(2), start + Duration::from_secs(9));

        limiter.prune(start + Duration::from_secs(10));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn pruning_is_amortized_under_a_flood_of_clients() {
        let limiter = RateLimiter::with_prune_threshold(5, Duration::from_secs(900), 100);
        let now = Instant::now();

        // Every client spends a token, so no bucket is ever prunable.
        for i in 0..1_000u32 {
            assert!(limiter.check_at(Some(IpAddr::from(i.to_be_bytes())), now));
        }
        assert_eq!(limiter.tracked_clients(), 1_000);

        // Thresholds go 100, 202, 406, 814: four scans for a thousand
        // clients rather than one per request past the first threshold.
        assert_eq!(limiter.prune_runs(), 4);
    }

    #[test]
    fn threshold_falls_back_once_buckets_drain() {
        let limiter = RateLimiter::with_prune_threshold(5, Duration::from_secs(10), 4);
        let start = Instant::now();
        for i in 0..10u8 {
            limiter.check_at(ip(i), start);
        }
        let runs = limiter.prune_runs();
        assert!(runs >= 1);

        // Everyone refilled: the next prune empties the map and the
        // threshold returns to its base.
        limiter.check_at(ip(200), start + Duration::from_secs(60));
        limiter.prune(start + Duration::from_secs(60));
        assert!(limiter.tracked_clients() <= 1);
        assert_eq!(limiter.prune_at.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn middleware_answers_429_envelope() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                Arc::new(RateLimiter::new(1, Duration::from_secs(60))),
                rate_limit,
            ));

        let first = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
