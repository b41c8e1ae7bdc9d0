//! Chat REST API Tests

use axum::{body::Body, http::Request, http::StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{body_json, test_settings, token_for, RecordingBackend, TestApp};

fn backend() -> RecordingBackend {
    RecordingBackend::new().with_chat("c1", &["alice", "bob"])
}

#[tokio::test]
async fn test_create_chat_adds_caller_as_creator() {
    let app = TestApp::spawn(backend()).await;

    let response = app
        .post_json_auth(
            "/api/v1/chats",
            r#"{"is_group": true, "name": "team", "participant_ids": ["bob"]}"#,
            &token_for("alice"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let chat = body_json(response).await;
    assert_eq!(chat["created_by"], "alice");
    assert_eq!(chat["participant_ids"], json!(["alice", "bob"]));
}

#[tokio::test]
async fn test_create_chat_validates_body() {
    let app = TestApp::spawn(backend()).await;

    let response = app
        .post_json_auth(
            "/api/v1/chats",
            r#"{"participant_ids": []}"#,
            &token_for("alice"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_message_history_paged_and_clamped() {
    let app = TestApp::spawn(backend()).await;

    let response = app
        .get_auth("/api/v1/chats/c1/messages?limit=500&offset=10", &token_for("bob"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let messages = body_json(response).await;
    assert_eq!(messages[0]["id"], "m-1");
    assert_eq!(app.backend.calls(), vec!["list:c1:100:10"]);
}

#[tokio::test]
async fn test_message_history_requires_participation() {
    let app = TestApp::spawn(backend()).await;

    let response = app
        .get_auth("/api/v1/chats/c1/messages", &token_for("mallory"))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_participants_listed_for_members() {
    let app = TestApp::spawn(backend()).await;

    let response = app
        .get_auth("/api/v1/chats/c1/participants", &token_for("alice"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"chat_id": "c1", "participant_ids": ["alice", "bob"]})
    );
}

#[tokio::test]
async fn test_unknown_chat_is_not_found() {
    let app = TestApp::spawn(backend()).await;

    let response = app
        .get_auth("/api/v1/chats/nope/participants", &token_for("alice"))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::spawn(backend()).await;

    let response = app.get("/api/v1/chats/c1/participants").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_rate_limit_per_source_address() {
    let mut settings = test_settings();
    settings.rate_limit.max_tokens = 2.0;
    settings.rate_limit.tokens_per_second = 0.01;
    let app = TestApp::spawn_with(settings, backend()).await;

    let request = |ip: &str| {
        Request::builder()
            .uri("/api/v1/chats/c1/participants")
            .header("Authorization", format!("Bearer {}", token_for("alice")))
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.request(request("10.0.0.1")).await.status(), StatusCode::OK);
    assert_eq!(app.request(request("10.0.0.1")).await.status(), StatusCode::OK);

    let denied = app.request(request("10.0.0.1")).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.headers().contains_key("retry-after"));
    assert_eq!(body_json(denied).await["code"], "RATE_LIMIT_EXCEEDED");

    // Another source has its own bucket
    assert_eq!(app.request(request("10.0.0.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_applies_before_authentication() {
    let mut settings = test_settings();
    settings.rate_limit.max_tokens = 1.0;
    settings.rate_limit.tokens_per_second = 0.01;
    let app = TestApp::spawn_with(settings, backend()).await;

    assert_eq!(
        app.get("/api/v1/chats/c1/participants").await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.get("/api/v1/chats/c1/participants").await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}
