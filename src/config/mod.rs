//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → environment overlay: PORT, MONGO_URI, SENTRY_DSN, ENABLE_METRICS,
//!       LOG_LEVEL, ALLOWED_ORIGINS, ... (loader.rs)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! With --watch:
//!     watcher.rs detects a file change
//!     → loader.rs reloads + validates
//!     → new log level applied; everything else keeps running as-is
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the log level is hot-reloadable
//! - All fields have defaults to allow an empty environment
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, LogFormat, ObservabilityConfig, SecurityConfig, ServerConfig, StoreConfig};
