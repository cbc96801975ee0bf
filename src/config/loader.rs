//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::{AppConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then an optional TOML file, then the
/// process environment. The result is validated before it is returned.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => AppConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML file without applying environment overrides.
pub fn parse_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` abstracts the environment so callers (and tests) can supply
/// their own source. Unset variables leave the current value untouched.
pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(env) = lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
        config.env = env;
    }

    if let Some(port) = lookup("PORT") {
        config.server.port = parse_env("PORT", &port)?;
    }
    if let Some(secs) = lookup("DRAIN_TIMEOUT_SECS") {
        config.server.drain_timeout_secs = parse_env("DRAIN_TIMEOUT_SECS", &secs)?;
    }

    if let Some(uri) = lookup("MONGO_URI") {
        config.store.uri = uri;
    }

    if let Some(dsn) = lookup("SENTRY_DSN") {
        config.observability.sentry_dsn = dsn.trim().to_string();
    }
    if let Some(flag) = lookup("ENABLE_METRICS") {
        // Only the literal "true" turns metrics on.
        config.observability.metrics_enabled = flag == "true";
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        let parsed = LogFormat::from_str(&format).map_err(|reason| ConfigError::Env {
            key: "LOG_FORMAT",
            value: format.clone(),
            reason,
        })?;
        config.observability.log_format = Some(parsed);
    }

    if let Some(origins) = lookup("ALLOWED_ORIGINS") {
        config.security.allowed_origins = split_origins(&origins);
    }
    if let Some(max) = lookup("RATE_LIMIT_MAX") {
        config.security.rate_limit_max = parse_env("RATE_LIMIT_MAX", &max)?;
    }
    if let Some(window) = lookup("RATE_LIMIT_WINDOW_SECS") {
        config.security.rate_limit_window_secs = parse_env("RATE_LIMIT_WINDOW_SECS", &window)?;
    }

    Ok(())
}

/// Split a comma separated allow-list, trimming entries and dropping empties.
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
