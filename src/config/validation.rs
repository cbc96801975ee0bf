//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! semantics. Every problem is collected so an operator sees the full list
//! at once.

use crate::config::schema::AppConfig;
use crate::observability::logging::parse_level;
use crate::observability::tracker::Dsn;
use crate::store::ConnectionString;

/// A single semantic configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.env.trim().is_empty() {
        errors.push(ValidationError::new("env", "must not be empty"));
    }

    if config.server.port == 0 {
        errors.push(ValidationError::new("server.port", "must be between 1 and 65535"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be positive"));
    }
    if config.server.drain_timeout_secs == 0 {
        errors.push(ValidationError::new("server.drain_timeout_secs", "must be positive"));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be positive"));
    }

    if let Err(e) = ConnectionString::parse(&config.store.uri) {
        errors.push(ValidationError::new("store.uri", e.to_string()));
    }
    if config.store.check_interval_secs == 0 {
        errors.push(ValidationError::new("store.check_interval_secs", "must be positive"));
    }
    if config.store.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("store.connect_timeout_secs", "must be positive"));
    }

    if parse_level(&config.observability.log_level).is_none() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if !config.observability.sentry_dsn.is_empty() {
        if let Err(e) = Dsn::parse(&config.observability.sentry_dsn) {
            errors.push(ValidationError::new("observability.sentry_dsn", e.to_string()));
        }
    }

    if config.security.allowed_origins.is_empty() {
        errors.push(ValidationError::new(
            "security.allowed_origins",
            "must list at least one origin or '*'",
        ));
    }
    if config.security.rate_limit_max == 0 {
        errors.push(ValidationError::new("security.rate_limit_max", "must be positive"));
    }
    if config.security.rate_limit_window_secs == 0 {
        errors.push(ValidationError::new("security.rate_limit_window_secs", "must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
