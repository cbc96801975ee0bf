//! Drain behavior on termination.

use std::time::Duration;

use axum::{routing::get, Router};
use status_service::http::server::app_routes;
use status_service::http::{AppState, DrainOutcome};

mod common;

fn slow_routes(delay: Duration) -> Router<AppState> {
    app_routes().route(
        "/slow",
        get(move || async move {
            tokio::time::sleep(delay).await;
            "done"
        }),
    )
}

#[tokio::test]
async fn in_flight_request_completes_after_shutdown_signal() {
    let app = common::spawn_app_with_routes(common::test_config(), slow_routes(Duration::from_millis(500))).await;

    let client = app.client.clone();
    let url = app.url("/slow");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });

    // Let the request reach the handler.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(app.shutdown.trigger());
    assert!(!app.shutdown.trigger(), "only one shutdown sequence runs");

    // New connections are refused once draining starts.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(tokio::net::TcpStream::connect(app.addr).await.is_err());

    let res = in_flight.await.unwrap().expect("in-flight request should be answered");
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "done");

    let outcome = tokio::time::timeout(Duration::from_secs(5), app.handle)
        .await
        .expect("server should stop after draining")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn idle_server_stops_immediately() {
    let app = common::spawn_app(common::test_config()).await;
    let res = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    app.shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), app.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DrainOutcome::Completed);
}

#[tokio::test]
async fn drain_deadline_abandons_stuck_requests() {
    let mut config = common::test_config();
    config.server.drain_timeout_secs = 1;
    config.server.request_timeout_secs = 60;
    let app = common::spawn_app_with_routes(config, slow_routes(Duration::from_secs(30))).await;

    let client = app.client.clone();
    let url = app.url("/slow");
    let _stuck = tokio::spawn(async move { client.get(url).send().await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    app.shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), app.handle)
        .await
        .expect("drain should be bounded")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DrainOutcome::TimedOut);
    assert!(!outcome.is_clean());
}

#[tokio::test]
async fn second_signal_forces_exit() {
    let app = common::spawn_app_with_routes(common::test_config(), slow_routes(Duration::from_secs(30))).await;

    let client = app.client.clone();
    let url = app.url("/slow");
    let _stuck = tokio::spawn(async move { client.get(url).send().await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    app.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;
    app.shutdown.force();

    let outcome = tokio::time::timeout(Duration::from_secs(2), app.handle)
        .await
        .expect("force should end the drain")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, DrainOutcome::Forced);
}
