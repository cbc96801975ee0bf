//! Request-path failures and the error envelope.
//!
//! Every error that leaves the service has the same body:
//! `{"success": false, "error": <message>, "status": <code>}` with the HTTP
//! status equal to `status`.

use std::error::Error as StdError;

use axum::{
    extract::OriginalUri,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";
pub const CORS_MESSAGE: &str = "CORS not allowed";

/// The only body shape used for failed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub status: u16,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            status: status.as_u16(),
        }
    }
}

/// Failure details attached to error responses as an extension, read by
/// the error stage for logging and forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    /// `source()` chain, outermost first.
    pub causes: Vec<String>,
}

/// Marks an error response whose body must be sent as is.
#[derive(Debug, Clone, Copy)]
pub struct VerbatimBody;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Request-path failure type. Handlers return it, middleware synthesizes it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not Found - {path}")]
    NotFound { path: String },

    #[error("{}", RATE_LIMIT_MESSAGE)]
    TooManyRequests,

    #[error("{}", CORS_MESSAGE)]
    OriginNotAllowed,

    /// A failure that declares its own status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ApiError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn internal<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// HTTP status of this failure, 500 unless it declares one.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::OriginNotAllowed => StatusCode::FORBIDDEN,
            Self::Status { status, .. } => *status,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = self.source();
        while let Some(err) = current {
            causes.push(err.to_string());
            current = err.source();
        }
        causes
    }

    /// Detach the report that travels with the response.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            status: self.status_code(),
            message: self.to_string(),
            causes: self.causes(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        envelope_response(self.report())
    }
}

/// Render `report` as an envelope response carrying the report itself.
pub fn envelope_response(report: ErrorReport) -> Response {
    let envelope = ErrorEnvelope::new(report.status, report.message.clone());
    let mut response = (report.status, Json(envelope)).into_response();
    response.extensions_mut().insert(report);
    response
}

/// Fallback for requests no route matched.
pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    ApiError::NotFound { path }
}

/// Whether `response` already carries the envelope, or is exempt from it.
pub(crate) fn is_shaped(response: &Response) -> bool {
    if response.extensions().get::<ErrorReport>().is_some()
        || response.extensions().get::<VerbatimBody>().is_some()
    {
        return true;
    }
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[derive(Debug, thiserror::Error)]
    #[error("pool exhausted")]
    struct PoolError(#[source] std::io::Error);

    async fn body_of(response: Response) -> ErrorEnvelope {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn not_found_envelope_names_the_path() {
        let response = ApiError::NotFound {
            path: "/api/totally-unknown".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.extensions().get::<ErrorReport>().is_some());
        assert_eq!(
            body_of(response).await,
            ErrorEnvelope {
                success: false,
                error: "Not Found - /api/totally-unknown".into(),
                status: 404,
            }
        );
    }

    #[tokio::test]
    async fn declared_status_is_used_for_both_code_and_body() {
        let response = ApiError::status(StatusCode::UNPROCESSABLE_ENTITY, "bad input").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let envelope = body_of(response).await;
        assert_eq!(envelope.status, 422);
        assert_eq!(envelope.error, "bad input");
    }

    #[test]
    fn internal_defaults_to_500_and_keeps_the_cause_chain() {
        let err = ApiError::internal(
            "database query failed",
            PoolError(std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out")),
        );
        let report = err.report();
        assert_eq!(report.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(report.message, "database query failed");
        assert_eq!(report.causes, vec!["pool exhausted", "socket timed out"]);
    }

    #[test]
    fn fixed_messages() {
        assert_eq!(ApiError::TooManyRequests.to_string(), RATE_LIMIT_MESSAGE);
        assert_eq!(ApiError::OriginNotAllowed.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::OriginNotAllowed.to_string(), "CORS not allowed");
    }

    #[test]
    fn shaped_detection() {
        assert!(is_shaped(&ApiError::TooManyRequests.into_response()));
        assert!(!is_shaped(&StatusCode::METHOD_NOT_ALLOWED.into_response()));
        assert!(!is_shaped(&(StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded").into_response()));
    }
}
