//! Per-request spans.
//!
//! # Responsibilities
//! - Open one span per request carrying the request id, method and route
//! - Configure the `TraceLayer` hooks used by the router
//!
//! # Design Decisions
//! - Route is the matched template, never the raw path
//! - Response events are debug level; the access log is the info-level record

use axum::{extract::MatchedPath, extract::Request};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::http::middleware::completion::UNMATCHED_ROUTE;
use crate::http::X_REQUEST_ID;

/// Build the span for one request.
pub fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or(UNMATCHED_ROUTE);

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        route = %route,
    )
}

pub type RequestTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    fn(&Request) -> Span,
>;

/// `TraceLayer` configured with [`request_span`].
pub fn trace_layer() -> RequestTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(request_span as fn(&Request) -> Span)
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
        .on_failure(DefaultOnFailure::new().level(Level::DEBUG))
}
