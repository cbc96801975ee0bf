//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (reject disallowed origins, answer preflights)
//!     → rate_limit.rs (per-IP token bucket)
//!     → handlers
//! Outgoing response:
//!     → headers.rs (hardening headers)
//! ```
//!
//! # Design Decisions
//! - Rejections are ordinary `ApiError`s, so they reach the client as the
//!   error envelope like any other failure
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use cors::OriginPolicy;
pub use rate_limit::RateLimiter;
