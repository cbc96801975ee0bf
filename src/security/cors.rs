//! Cross-origin request policy.
//!
//! # Responsibilities
//! - Reject requests from origins outside `ALLOWED_ORIGINS` with a 403 envelope
//! - Answer preflights and add CORS headers (with credentials) for allowed ones
//!
//! # Design Decisions
//! - Requests without an `Origin` header (curl, same-origin, health probes)
//!   are always allowed
//! - `*` mirrors the request origin, since credentials rule out a literal wildcard

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::SecurityConfig;
use crate::http::error::ApiError;

/// Allow-list decision shared by the guard and the CORS layer.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    any: bool,
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            any: config.allows_any_origin(),
            allowed: config
                .allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_string())
                .collect(),
        }
    }

    /// Whether a request carrying `origin` may proceed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.any => true,
            Some(origin) => {
                let origin = origin.trim_end_matches('/');
                self.allowed.iter().any(|allowed| allowed == origin)
            }
        }
    }

    /// CORS layer answering for the same allow-list.
    pub fn layer(&self) -> CorsLayer {
        let origins = if self.any {
            AllowOrigin::mirror_request()
        } else {
            let values: Vec<HeaderValue> = self
                .allowed
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring allowed origin that is not a valid header value");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(values)
        };

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    }
}

/// Middleware: reject disallowed origins before any CORS processing.
pub async fn origin_guard(State(policy): State<Arc<OriginPolicy>>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default().to_string());

    if policy.allows(origin.as_deref()) {
        next.run(request).await
    } else {
        tracing::warn!(origin = origin.as_deref().unwrap_or_default(), "Origin not allowed");
        ApiError::OriginNotAllowed.into_response()
    }
}
