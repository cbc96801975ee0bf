//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber once per process
//! - Translate `LOG_LEVEL` (including winston-style names) into a filter
//! - Allow the level to be changed at runtime through a reload handle
//!
//! # Design Decisions
//! - JSON output for production, human readable output elsewhere
//! - `RUST_LOG`, when set, takes precedence over `LOG_LEVEL`

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// Errors raised while configuring the logging subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to reload filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Map a configured level name onto a tracing filter.
///
/// Accepts tracing names as well as the npm/winston ladder
/// (`http` and `verbose` sit between info and debug, `silly` is trace).
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" | "silent" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "http" | "verbose" | "debug" => Some(LevelFilter::DEBUG),
        "silly" | "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

fn filter_for(level: &str) -> Result<EnvFilter, LoggingError> {
    let level = parse_level(level).ok_or_else(|| LoggingError::UnknownLevel(level.to_string()))?;
    Ok(EnvFilter::default().add_directive(level.into()))
}

/// Handle used to change the active log level after startup.
#[derive(Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// Replace the active filter with one built from `level`.
    pub fn set(&self, level: &str) -> Result<(), LoggingError> {
        let filter = filter_for(level)?;
        self.inner.reload(filter)?;
        Ok(())
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig, env: &str) -> Result<LogLevelHandle, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for(&config.log_level)?,
    };
    let (filter_layer, handle) = reload::Layer::new(filter);

    let format = config.log_format.unwrap_or(if env == "production" {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });

    let registry = tracing_subscriber::registry().with(filter_layer);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
    }

    Ok(LogLevelHandle { inner: handle })
}
