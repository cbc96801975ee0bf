//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the metrics context, store monitor and error tracker from config
//! - Bind the listener (failure is fatal)
//! - Start background tasks, serve, and wait for them on the way out
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last, once everything it serves is ready

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::http::server::app_routes;
use crate::http::{AppState, DrainOutcome, HttpServer, ServerError};
use crate::lifecycle::inflight::InflightTracker;
use crate::lifecycle::Shutdown;
use crate::observability::{MetricsContext, Sampler, SentryTracker};
use crate::store::{StoreHandle, StoreMonitor};

/// A fully initialized, bound, not yet serving service.
pub struct Application {
    config: Arc<AppConfig>,
    state: AppState,
    routes: Router<AppState>,
    listener: TcpListener,
    addr: SocketAddr,
    monitor: Option<StoreMonitor>,
    shutdown: Shutdown,
}

impl Application {
    /// Initialize every subsystem and bind the configured address.
    pub async fn build(config: AppConfig) -> Result<Self, ServerError> {
        Self::build_with_routes(config, app_routes()).await
    }

    /// Like [`Application::build`], serving `routes` instead of the defaults.
    pub async fn build_with_routes(config: AppConfig, routes: Router<AppState>) -> Result<Self, ServerError> {
        let config = Arc::new(config);

        let metrics = if config.observability.metrics_enabled {
            tracing::info!("Metrics enabled");
            Some(MetricsContext::new()?)
        } else {
            None
        };

        let tracker = SentryTracker::from_config(&config.observability.sentry_dsn, &config.env)?;

        let (store, monitor) = if config.is_test() {
            tracing::debug!("Test environment, store connection skipped");
            (StoreHandle::disconnected(), None)
        } else {
            let monitor = StoreMonitor::new(&config.store)?;
            (monitor.handle(), Some(monitor))
        };

        let state = AppState {
            config: Arc::clone(&config),
            metrics,
            store: Arc::new(store),
            tracker,
            inflight: InflightTracker::new(),
        };

        let listener = HttpServer::bind(&config.bind_address()).await?;
        let addr = listener.local_addr()?;

        Ok(Self {
            config,
            state,
            routes,
            listener,
            addr,
            monitor,
            shutdown: Shutdown::new(),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle used to start (or force) shutdown.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until shutdown completes.
    pub async fn run(self) -> Result<DrainOutcome, ServerError> {
        let sampler = self.state.metrics.as_ref().map(|ctx| {
            Sampler::new(ctx.clone()).spawn(&self.shutdown)
        });

        let monitor = self
            .monitor
            .map(|monitor| tokio::spawn(monitor.run(self.shutdown.subscribe())));

        let hooks = self.state.default_hooks();
        let server = HttpServer::with_routes(self.routes, self.state, hooks);
        let env = self.config.env.clone();

        let outcome = server
            .run(
                self.listener,
                &self.shutdown,
                Duration::from_secs(self.config.server.drain_timeout_secs),
                |addr| tracing::info!(address = %addr, env = %env, "Server listening"),
            )
            .await?;

        // No-op after a signal; stops the background tasks if serving ended on its own.
        self.shutdown.trigger();
        if let Some(sampler) = sampler {
            sampler.join().await;
        }
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        tracing::info!(outcome = ?outcome, "Shutdown complete");
        Ok(outcome)
    }
}
