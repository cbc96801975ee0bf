//! Status service.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!   Client Request     │  request id → trace → completion → error     │
//!   ───────────────────┼─▶ stage → security → limits → route          │
//!                      │                      │                       │
//!                      │           ┌──────────┴─────────┐             │
//!                      │           ▼                    ▼             │
//!                      │     /api/health          /api/metrics        │
//!                      │     (store state)        (registry render)   │
//!                      │                                              │
//!                      │  completion listeners: metrics, access log   │
//!                      │  background: sampler, store monitor          │
//!                      │  lifecycle: signals → drain → exit code      │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use status_service::config::{load_config, watcher};
use status_service::lifecycle::{spawn_signal_listener, Application};
use status_service::observability::init_logging;

#[derive(Parser)]
#[command(name = "status-service", version, about = "Health and metrics HTTP service")]
struct Args {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Listen port, overriding PORT and the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Reload the configuration file when it changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("status-service: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let log_level = init_logging(&config.observability, &config.env)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %config.env,
        bind_address = %config.bind_address(),
        metrics_enabled = config.observability.metrics_enabled,
        error_tracker = !config.observability.sentry_dsn.is_empty(),
        "status-service starting"
    );

    // Keep the watcher alive for the life of the process.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (config_watcher, updates) = watcher::ConfigWatcher::new(path);
            match config_watcher.run() {
                Ok(handle) => {
                    tokio::spawn(watcher::apply_reloads(updates, log_level));
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        _ => None,
    };

    let app = match Application::build(config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Ok(ExitCode::FAILURE);
        }
    };

    spawn_signal_listener(app.shutdown_handle())?;

    match app.run().await {
        Ok(outcome) if outcome.is_clean() => Ok(ExitCode::SUCCESS),
        Ok(outcome) => {
            tracing::warn!(outcome = ?outcome, "Exiting before in-flight requests finished");
            Ok(ExitCode::from(1))
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
