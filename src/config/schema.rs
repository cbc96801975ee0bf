//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits so a TOML file can provide any subset of
//! fields; environment variables are layered on top by the loader.

use serde::{Deserialize, Serialize};

/// Root configuration for the status service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment name (development, production, test, ...).
    pub env: String,

    /// Listener and request handling settings.
    pub server: ServerConfig,

    /// Document store connection settings.
    pub store: StoreConfig,

    /// Logging, metrics and error tracking.
    pub observability: ObservabilityConfig,

    /// CORS, security headers and rate limiting.
    pub security: SecurityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Whether this process runs as part of a test suite.
    pub fn is_test(&self) -> bool {
        self.env == "test"
    }

    /// Address string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Upper bound for a single request, in seconds.
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests, in seconds.
    pub drain_timeout_secs: u64,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            request_timeout_secs: 30,
            drain_timeout_secs: 30,
            max_body_bytes: 100 * 1024,
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string (`mongodb://` or `mongodb+srv://`).
    pub uri: String,

    /// Maximum pooled connections handed to the store client.
    pub pool_size: u32,

    /// Interval between reachability probes, in seconds.
    pub check_interval_secs: u64,

    /// Timeout for a single probe, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017/app".to_string(),
            pool_size: 10,
            check_interval_secs: 5,
            connect_timeout_secs: 3,
        }
    }
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (error, warn, info, http, verbose, debug, silly, trace).
    pub log_level: String,

    /// Log encoding. `None` picks JSON in production and pretty elsewhere.
    pub log_format: Option<LogFormat>,

    /// Enable the metrics registry, sampler and exposition endpoint.
    pub metrics_enabled: bool,

    /// Error tracker DSN. Empty disables tracking.
    pub sentry_dsn: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: None,
            metrics_enabled: false,
            sentry_dsn: String::new(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// CORS allow-list. A `*` entry allows every origin.
    pub allowed_origins: Vec<String>,

    /// Add hardening response headers.
    pub security_headers: bool,

    /// Requests allowed per client within one window.
    pub rate_limit_max: u32,

    /// Rate limit window in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            security_headers: true,
            rate_limit_max: 100,
            rate_limit_window_secs: 15 * 60,
        }
    }
}

impl SecurityConfig {
    /// Whether the allow-list accepts any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}
