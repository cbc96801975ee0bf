//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, pipeline assembly, drain)
//!     → middleware/ (request id, completion events, error stage)
//!     → handlers.rs (health, metrics)
//!     → error.rs (no route matched, or a handler failed)
//!     → Send to client
//! ```

use axum::http::HeaderName;

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::{ApiError, ErrorEnvelope};
pub use server::{AppState, DrainOutcome, HttpServer, ServerError};

/// Correlation header, generated when the client does not send one.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
