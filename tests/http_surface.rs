//! End-to-end tests of the HTTP surface over a real socket.

use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use serde_json::Value;
use status_service::http::server::app_routes;
use status_service::http::{ApiError, AppState, ErrorEnvelope};

mod common;

#[tokio::test]
async fn health_is_ok_without_a_store() {
    let app = common::spawn_app(common::test_config()).await;

    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("x-request-id").is_some());
    assert_eq!(res.headers().get("x-content-type-options").unwrap(), "nosniff");

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "test");
    assert_eq!(body["dbConnected"], false);
}

#[tokio::test]
async fn unknown_route_returns_envelope_and_service_keeps_running() {
    let app = common::spawn_app(common::test_config()).await;

    let res = app.client.get(app.url("/api/totally-unknown")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let envelope: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(
        envelope,
        ErrorEnvelope {
            success: false,
            error: "Not Found - /api/totally-unknown".into(),
            status: 404,
        }
    );

    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn metrics_disabled_returns_404_text() {
    let app = common::spawn_app(common::test_config()).await;

    let res = app.client.get(app.url("/api/metrics")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "Metrics disabled");
}

#[tokio::test]
async fn metrics_record_the_health_request() {
    let mut config = common::test_config();
    config.observability.metrics_enabled = true;
    let app = common::spawn_app(config).await;

    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    res.bytes().await.unwrap();

    // The observation lands once the health response body has been sent.
    let mut text = String::new();
    for _ in 0..20 {
        let res = app.client.get(app.url("/api/metrics")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        text = res.text().await.unwrap();
        if text.contains("route=\"/api/health\"") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    assert!(text.contains("# TYPE http_request_duration_seconds histogram"));
    assert!(text.contains(
        "http_request_duration_seconds_count{method=\"GET\",route=\"/api/health\",status_code=\"200\"} 1"
    ));
    assert!(text.contains("process_start_time_seconds"));
    for line in text.lines().filter(|l| l.starts_with("event_loop_lag_ms")) {
        let value: f64 = line.rsplit(' ').next().unwrap().parse().unwrap();
        assert!(value >= 0.0);
    }
}

async fn handler_bug() -> &'static str {
    panic!("handler bug")
}

#[tokio::test]
async fn handler_failures_and_panics_are_enveloped() {
    let routes: Router<AppState> = app_routes()
        .route(
            "/api/conflict",
            get(|| async { Err::<(), _>(ApiError::status(StatusCode::CONFLICT, "already exists")) }),
        )
        .route("/api/panic", get(handler_bug));
    let app = common::spawn_app_with_routes(common::test_config(), routes).await;

    let res = app.client.get(app.url("/api/conflict")).send().await.unwrap();
    assert_eq!(res.status(), 409);
    let envelope: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(envelope.error, "already exists");
    assert_eq!(envelope.status, 409);

    let res = app.client.get(app.url("/api/panic")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.headers().get("x-content-type-options").unwrap(), "nosniff");
    let envelope: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(envelope.error, "Internal Server Error");

    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn wrong_method_is_enveloped() {
    let app = common::spawn_app(common::test_config()).await;

    let res = app.client.post(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 405);
    let envelope: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(envelope.status, 405);
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let mut config = common::test_config();
    config.security.rate_limit_max = 3;
    let app = common::spawn_app(config).await;

    for _ in 0..3 {
        let res = app.client.get(app.url("/api/health")).send().await.unwrap();
        assert_eq!(res.status(), 200);
    }
    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 429);
    let envelope: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(envelope.error, "Too many requests, please try again later.");
}

#[tokio::test]
async fn cors_allow_list_is_enforced() {
    let mut config = common::test_config();
    config.security.allowed_origins = vec!["http://localhost:3000".into()];
    let app = common::spawn_app(config).await;

    let res = app
        .client
        .get(app.url("/api/health"))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "http://localhost:3000"
    );

    let res = app
        .client
        .get(app.url("/api/health"))
        .header("origin", "http://attacker.test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let envelope: ErrorEnvelope = res.json().await.unwrap();
    assert_eq!(envelope.error, "CORS not allowed");
}
