//! Terminal error stage.
//!
//! Sits outside the handlers and every failure-producing layer. For each
//! failed response it logs the failure, forwards server errors to the error
//! tracker when one is configured, and makes sure the body is the error
//! envelope. Responses built from [`ApiError`](crate::http::error::ApiError)
//! already carry an [`ErrorReport`]; bare framework responses (405, 408,
//! 413, extractor rejections) are re-shaped here.

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::error::{envelope_response, is_shaped, ErrorReport, INTERNAL_ERROR_MESSAGE};
use crate::http::X_REQUEST_ID;
use crate::observability::tracker::{dispatch, ErrorTracker, FailureReport};

/// Shared state of the error stage.
#[derive(Clone, Default)]
pub struct ErrorStage {
    pub tracker: Option<Arc<dyn ErrorTracker>>,
}

pub async fn handle_errors(State(stage): State<ErrorStage>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (response, report) = if is_shaped(&response) {
        let report = response.extensions().get::<ErrorReport>().cloned();
        (response, report)
    } else {
        let (response, report) = reshape(response);
        (response, Some(report))
    };

    // Verbatim error bodies are intentional answers, not failures.
    let Some(report) = report else {
        return response;
    };

    tracing::error!(
        status = report.status.as_u16(),
        method = %method,
        path = %path,
        request_id = request_id.as_deref().unwrap_or("-"),
        causes = ?report.causes,
        "{}",
        report.message
    );

    if report.status.is_server_error() {
        if let Some(tracker) = &stage.tracker {
            dispatch(
                Arc::clone(tracker),
                FailureReport {
                    message: report.message.clone(),
                    status: report.status.as_u16(),
                    method,
                    path,
                    request_id,
                    causes: report.causes,
                },
            );
        }
    }

    response
}

/// Replace a bare error body with the envelope, keeping status and headers.
fn reshape(response: Response) -> (Response, ErrorReport) {
    let (parts, _) = response.into_parts();
    let report = ErrorReport {
        status: parts.status,
        message: parts
            .status
            .canonical_reason()
            .unwrap_or(INTERNAL_ERROR_MESSAGE)
            .to_string(),
        causes: Vec::new(),
    };

    let mut reshaped = envelope_response(report.clone());
    for (name, value) in parts.headers.iter() {
        if name == header::CONTENT_LENGTH || name == header::CONTENT_TYPE {
            continue;
        }
        reshaped.headers_mut().append(name.clone(), value.clone());
    }
    (reshaped, report)
}

/// Panic handler for `CatchPanicLayer`. The payload is logged and
/// forwarded, never shown to the client.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");

    envelope_response(ErrorReport {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: INTERNAL_ERROR_MESSAGE.to_string(),
        causes: vec![detail],
    })
}
