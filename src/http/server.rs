//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router and wrap it in the request pipeline
//! - Bind the listener (failure is fatal)
//! - Serve until shutdown, then drain with a deadline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

use crate::config::AppConfig;
use crate::http::error::not_found;
use crate::http::handlers::{self, HEALTH_ROUTE, METRICS_ROUTE};
use crate::http::middleware::completion::{track_completion, CompletionState};
use crate::http::middleware::error_stage::{handle_errors, panic_response};
use crate::http::middleware::{AccessLogListener, CompletionHooks, ErrorStage, MetricsListener};
use crate::http::X_REQUEST_ID;
use crate::lifecycle::inflight::InflightTracker;
use crate::lifecycle::Shutdown;
use crate::observability::metrics::MetricsError;
use crate::observability::tracing::trace_layer;
use crate::observability::tracker::{ErrorTracker, TrackerError};
use crate::observability::MetricsContext;
use crate::security::cors::origin_guard;
use crate::security::headers::with_security_headers;
use crate::security::rate_limit::rate_limit;
use crate::security::{OriginPolicy, RateLimiter};
use crate::store::{StoreError, StoreStatus};

/// Errors that stop the server from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("error tracker setup failed: {0}")]
    Tracker(#[from] TrackerError),

    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),
}

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// `None` when metrics are disabled.
    pub metrics: Option<MetricsContext>,
    pub store: Arc<dyn StoreStatus>,
    /// `None` when no tracker is configured.
    pub tracker: Option<Arc<dyn ErrorTracker>>,
    pub inflight: InflightTracker,
}

impl AppState {
    /// Default completion listeners: metrics first (when enabled), then the access log.
    pub fn default_hooks(&self) -> CompletionHooks {
        let mut hooks = CompletionHooks::new();
        if let Some(ctx) = &self.metrics {
            hooks = hooks.with(Arc::new(MetricsListener::new(Arc::clone(&ctx.instruments))));
        }
        hooks.with(Arc::new(AccessLogListener))
    }
}

/// Routes served by the service.
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .route(HEALTH_ROUTE, get(handlers::health))
        .route(METRICS_ROUTE, get(handlers::metrics))
}

/// Wrap `routes` in the full request pipeline.
///
/// Layers added later sit further out; see `http::middleware` for the
/// resulting order.
pub fn with_pipeline(routes: Router<AppState>, state: AppState, hooks: CompletionHooks) -> Router {
    let config = Arc::clone(&state.config);
    let policy = OriginPolicy::from_config(&config.security);

    let router = routes
        .fallback(not_found)
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            Arc::new(RateLimiter::from_config(&config.security)),
            rate_limit,
        ))
        .layer(policy.layer())
        .layer(middleware::from_fn_with_state(Arc::new(policy), origin_guard))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            ErrorStage {
                tracker: state.tracker.clone(),
            },
            handle_errors,
        ));

    // Outside the error stage so panics and reshaped errors carry them too.
    let router = if config.security.security_headers {
        with_security_headers(router)
    } else {
        router
    };

    router
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn_with_state(
            CompletionState {
                hooks,
                inflight: state.inflight.clone(),
            },
            track_completion,
        ))
        .layer(trace_layer())
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

/// How the drain phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight request finished.
    Completed,
    /// The drain deadline passed first.
    TimedOut,
    /// A second termination signal abandoned the drain.
    Forced,
}

impl DrainOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    inflight: InflightTracker,
}

impl HttpServer {
    /// Create a server for `state` serving the default routes and listeners.
    pub fn new(state: AppState) -> Self {
        let hooks = state.default_hooks();
        Self::with_routes(app_routes(), state, hooks)
    }

    pub fn with_routes(routes: Router<AppState>, state: AppState, hooks: CompletionHooks) -> Self {
        let inflight = state.inflight.clone();
        Self {
            router: with_pipeline(routes, state, hooks),
            inflight,
        }
    }

    /// Bind the listening socket.
    pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
        TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    ///
    /// `on_ready` runs exactly once, after the server is accepting.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        shutdown: &Shutdown,
        drain_timeout: Duration,
        on_ready: F,
    ) -> Result<DrainOutcome, ServerError>
    where
        F: FnOnce(SocketAddr),
    {
        let addr = listener.local_addr()?;
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        let mut stop_accepting = shutdown.subscribe();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop_accepting.draining().await })
                .await
        });

        on_ready(addr);

        let mut draining = shutdown.subscribe();
        tokio::select! {
            joined = &mut server => {
                // Ended on its own, before any shutdown request.
                flatten(joined)?;
                return Ok(DrainOutcome::Completed);
            }
            _ = draining.draining() => {}
        }

        tracing::info!(
            in_flight = self.inflight.active_count(),
            timeout_secs = drain_timeout.as_secs(),
            "Stopped accepting connections, draining"
        );

        let mut forced = shutdown.subscribe();
        tokio::select! {
            joined = &mut server => {
                flatten(joined)?;
                tracing::info!("Drain complete");
                Ok(DrainOutcome::Completed)
            }
            _ = tokio::time::sleep(drain_timeout) => {
                tracing::error!(
                    in_flight = self.inflight.active_count(),
                    "Drain timed out, abandoning in-flight requests"
                );
                server.abort();
                Ok(DrainOutcome::TimedOut)
            }
            _ = forced.forced() => {
                tracing::warn!(
                    in_flight = self.inflight.active_count(),
                    "Drain abandoned"
                );
                server.abort();
                Ok(DrainOutcome::Forced)
            }
        }
    }
}

fn flatten(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<(), ServerError> {
    match joined {
        Ok(result) => Ok(result?),
        Err(e) => Err(ServerError::Serve(std::io::Error::other(e))),
    }
}
