//! API Surface Tests
//!
//! Drives the full router in-process with `tower::ServiceExt::oneshot`:
//! the submit/status round trip and the per-client rate limiter. Requests
//! carry a synthetic peer address because the rate limiter keys on it.

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use blobscope::api::{create_app, AppContext};
use blobscope::config::ServiceConfig;
use blobscope::health::HealthMonitor;
use blobscope::orchestrator::Orchestrator;
use blobscope::pipeline::PipelineEngine;
use blobscope::stages::{build_detectors, build_stages};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn test_app(rate_limit_burst: u32) -> (Router, Arc<Orchestrator>) {
    let mut config = ServiceConfig::default();
    config.server.rate_limit_burst = rate_limit_burst;
    // Effectively no replenishment within a test run.
    config.server.rate_limit_replenish_ms = 60_000;

    let detectors = build_detectors(&config.detectors);
    let stages = build_stages(&config.pipeline, detectors.clone());
    let engine = PipelineEngine::new(stages, 4, Duration::from_secs(5));
    let orchestrator = Orchestrator::start(engine, &config);

    let ctx = AppContext {
        orchestrator: Arc::clone(&orchestrator),
        detectors,
        monitor: Arc::new(HealthMonitor::new()),
    };
    (create_app(ctx, &config.server), orchestrator)
}

fn client(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn get(uri: &str, peer: SocketAddr) -> Request<Body> {
    let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

fn post(uri: &str, peer: SocketAddr, body: Vec<u8>) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    req.extensions_mut().insert(ConnectInfo(peer));
    req
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn submit_then_status_round_trip() {
    let (app, orch) = test_app(100);
    let peer = client(40001);

    let resp = app
        .clone()
        .oneshot(post("/api/v1/diagnostics", peer, vec![0u8; 64]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = json_body(resp).await;
    let job_id = body["data"]["job_id"].as_str().expect("job id").to_string();

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/v1/diagnostics/{job_id}"), peer))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let status = body["data"]["status"].as_str().expect("status");
    assert!(matches!(status, "pending" | "processing" | "completed"));

    let resp = app
        .clone()
        .oneshot(get("/api/v1/diagnostics/00000000-0000-0000-0000-000000000000", peer))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    orch.shutdown().await;
}

#[tokio::test]
async fn empty_submission_is_rejected_with_bad_request() {
    let (app, orch) = test_app(100);
    let resp = app
        .oneshot(post("/api/v1/diagnostics", client(40002), Vec::new()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    orch.shutdown().await;
}

#[tokio::test]
async fn rate_limit_kicks_in_after_the_burst() {
    let (app, orch) = test_app(3);
    let peer = client(40003);

    for _ in 0..3 {
        let resp = app
            .clone()
            .oneshot(get("/api/v1/health/live", peer))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .clone()
        .oneshot(get("/api/v1/health/live", peer))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    orch.shutdown().await;
}

#[tokio::test]
async fn rate_limit_budgets_are_per_client() {
    let (app, orch) = test_app(2);
    let first = client(40004);
    let second = client(40005);

    for _ in 0..3 {
        let _ = app.clone().oneshot(get("/api/v1/health/live", first)).await;
    }
    let exhausted = app
        .clone()
        .oneshot(get("/api/v1/health/live", first))
        .await
        .unwrap();
    assert_eq!(exhausted.status(), StatusCode::TOO_MANY_REQUESTS);

    let fresh = app
        .clone()
        .oneshot(get("/api/v1/health/live", second))
        .await
        .unwrap();
    assert_eq!(fresh.status(), StatusCode::OK);

    orch.shutdown().await;
}

#[tokio::test]
async fn bare_health_route_is_not_rate_limited() {
    let (app, orch) = test_app(1);
    let peer = client(40006);

    for _ in 0..5 {
        let resp = app.clone().oneshot(get("/health", peer)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    orch.shutdown().await;
}
