//! Status service library: a small HTTP service with an observable request
//! pipeline (timing metrics, access logging, uniform error envelopes) and
//! graceful drain on shutdown.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::{Application, Shutdown};
