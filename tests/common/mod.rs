//! Shared utilities for integration tests.

use std::net::SocketAddr;

use axum::Router;
use status_service::config::AppConfig;
use status_service::http::server::app_routes;
use status_service::http::{AppState, DrainOutcome, ServerError};
use status_service::lifecycle::{Application, Shutdown};
use tokio::task::JoinHandle;

/// A running service bound to an ephemeral local port.
pub struct TestApp {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<DrainOutcome, ServerError>>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config for tests: loopback, ephemeral port, no store connection.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.env = "test".into();
    config.server.host = "127.0.0.1".into();
    config.server.port = 0;
    config
}

/// Start the service with the default routes.
#[allow(dead_code)]
pub async fn spawn_app(config: AppConfig) -> TestApp {
    spawn_app_with_routes(config, app_routes()).await
}

/// Start the service serving `routes`.
pub async fn spawn_app_with_routes(config: AppConfig, routes: Router<AppState>) -> TestApp {
    let app = Application::build_with_routes(config, routes)
        .await
        .expect("application should start");
    let addr = app.local_addr();
    let shutdown = app.shutdown_handle();
    let handle = tokio::spawn(app.run());

    TestApp {
        addr,
        shutdown,
        handle,
        client: reqwest::Client::new(),
    }
}
