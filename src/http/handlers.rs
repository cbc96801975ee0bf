//! Route handlers.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::error::VerbatimBody;
use crate::http::server::AppState;
use crate::observability::metrics::EXPOSITION_CONTENT_TYPE;

pub const HEALTH_ROUTE: &str = "/api/health";
pub const METRICS_ROUTE: &str = "/api/metrics";

pub const METRICS_DISABLED: &str = "Metrics disabled";

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub env: String,
    #[serde(rename = "dbConnected")]
    pub db_connected: bool,
}

/// Always 200; store connectivity only shows up in `dbConnected`.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok".to_string(),
        env: state.config.env.clone(),
        db_connected: state.store.is_connected(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(ctx) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
            ctx.render(),
        )
            .into_response(),
        None => {
            let mut response = (
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                METRICS_DISABLED,
            )
                .into_response();
            response.extensions_mut().insert(VerbatimBody);
            response
        }
    }
}
