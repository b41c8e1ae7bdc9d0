//! Health Check API Tests

use axum::http::StatusCode;

use crate::common::{body_json, RecordingBackend, TestApp};

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::spawn(RecordingBackend::new()).await;

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::spawn(RecordingBackend::new()).await;

    let response = app.get("/health/live").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_hub_counts() {
    let app = TestApp::spawn(RecordingBackend::new().with_chat("c1", &["alice"])).await;
    let _socket = app.connect("c1", "alice").await;

    let response = app.get("/health/ready").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["websocket"]["active_connections"], 1);
    assert_eq!(json["checks"]["websocket"]["active_rooms"], 1);
    assert_eq!(json["checks"]["pools"], serde_json::json!([]));
}

#[tokio::test]
async fn test_metrics_exposed_as_text() {
    let app = TestApp::spawn(RecordingBackend::new()).await;

    let response = app.get("/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
