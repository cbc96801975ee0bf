//! Request completion events.
//!
//! The completion stage wraps each response body. When the body has been
//! fully sent (or dropped by the connection) it builds one
//! [`RequestCompletion`] and hands it to every registered listener, in
//! registration order. Listeners run after the response has left the
//! service, so they never delay it.

use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Version},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::http::X_REQUEST_ID;
use crate::lifecycle::inflight::{InflightGuard, InflightTracker};
use crate::observability::instruments::ServiceInstruments;

/// Route label for requests that matched no route template.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Everything known about one finished request.
#[derive(Debug, Clone)]
pub struct RequestCompletion {
    pub method: Method,
    /// Requested path including the query string.
    pub path: String,
    /// Matched route template, or [`UNMATCHED_ROUTE`].
    pub route: String,
    pub status: StatusCode,
    pub version: Version,
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    /// Response body bytes sent.
    pub body_bytes: u64,
    pub client: Option<IpAddr>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

/// Observer of request completions.
pub trait CompletionListener: Send + Sync {
    fn on_complete(&self, event: &RequestCompletion);
}

/// Ordered listener list, fixed once the router is built.
#[derive(Clone, Default)]
pub struct CompletionHooks {
    listeners: Vec<Arc<dyn CompletionListener>>,
}

impl CompletionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn CompletionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    fn emit(&self, event: &RequestCompletion) {
        for listener in &self.listeners {
            listener.on_complete(event);
        }
    }
}

/// Folds completions into the duration histogram and request counter.
pub struct MetricsListener {
    instruments: Arc<ServiceInstruments>,
}

impl MetricsListener {
    pub fn new(instruments: Arc<ServiceInstruments>) -> Self {
        Self { instruments }
    }
}

impl CompletionListener for MetricsListener {
    fn on_complete(&self, event: &RequestCompletion) {
        self.instruments.record_request(
            event.method.as_str(),
            &event.route,
            event.status.as_u16(),
            event.elapsed,
        );
    }
}

/// Shared state of the completion stage.
#[derive(Clone)]
pub struct CompletionState {
    pub hooks: CompletionHooks,
    pub inflight: InflightTracker,
}

/// Middleware: start the clock, then wrap the response body.
pub async fn track_completion(
    State(state): State<CompletionState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let guard = state.inflight.track();

    let pending = Pending {
        method: request.method().clone(),
        path: request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string()),
        route: request
            .extensions()
            .get::<MatchedPath>()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string()),
        version: request.version(),
        started,
        started_at: Utc::now(),
        client: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip()),
        referrer: header_string(request.headers(), header::REFERER),
        user_agent: header_string(request.headers(), header::USER_AGENT),
        request_id: header_string(request.headers(), X_REQUEST_ID),
        hooks: state.hooks.clone(),
        _guard: guard,
    };

    let response = next.run(request).await;
    let (parts, body) = response.into_parts();
    let body = CompletionBody {
        inner: body,
        status: parts.status,
        bytes: 0,
        pending: Some(pending),
    };
    Response::from_parts(parts, Body::new(body))
}

fn header_string<K: header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

struct Pending {
    method: Method,
    path: String,
    route: String,
    version: Version,
    started: Instant,
    started_at: DateTime<Utc>,
    client: Option<IpAddr>,
    referrer: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
    hooks: CompletionHooks,
    _guard: InflightGuard,
}

/// Response body that emits the completion event exactly once.
struct CompletionBody {
    inner: Body,
    status: StatusCode,
    bytes: u64,
    pending: Option<Pending>,
}

impl CompletionBody {
    fn finish(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let event = RequestCompletion {
            method: pending.method,
            path: pending.path,
            route: pending.route,
            status: self.status,
            version: pending.version,
            elapsed: pending.started.elapsed(),
            started_at: pending.started_at,
            body_bytes: self.bytes,
            client: pending.client,
            referrer: pending.referrer,
            user_agent: pending.user_agent,
            request_id: pending.request_id,
        };
        pending.hooks.emit(&event);
    }
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => this.finish(),
            Poll::Pending => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        self.finish();
    }
}
