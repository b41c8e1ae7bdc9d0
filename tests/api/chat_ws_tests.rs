//! Socket Relay Tests
//!
//! Real sockets against a gateway on an ephemeral port.

use std::time::Duration;

use axum::http::StatusCode;
use chat_gateway::config::Settings;
use chat_gateway::presentation::websocket::Frame;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::common::{
    assert_silent, next_json, send_json, test_settings, token_for, RecordingBackend, TestApp,
};

fn backend() -> RecordingBackend {
    RecordingBackend::new()
        .with_chat("c1", &["alice", "bob"])
        .with_chat("c2", &["alice", "carol"])
}

#[tokio::test]
async fn test_greeting_names_chat_and_user() {
    let app = TestApp::spawn(backend()).await;
    let url = app.ws_url("c1", &token_for("alice"));

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let greeting = next_json(&mut socket).await;

    assert_eq!(greeting["type"], "connection_established");
    assert_eq!(greeting["chat_id"], "c1");
    assert_eq!(greeting["user_id"], "alice");
    assert!(greeting["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_text_reaches_every_participant_with_backend_id() {
    let app = TestApp::spawn(backend()).await;
    let mut alice = app.connect("c1", "alice").await;
    let mut bob = app.connect("c1", "bob").await;

    send_json(
        &mut alice,
        json!({"type": "text", "content": "hi bob", "message_id": "tmp-1"}),
    )
    .await;

    for socket in [&mut alice, &mut bob] {
        let frame = next_json(socket).await;
        assert_eq!(frame["type"], "text");
        assert_eq!(frame["content"], "hi bob");
        assert_eq!(frame["message_id"], "m-1");
        assert_eq!(frame["original_id"], "tmp-1");
        assert_eq!(frame["sender_id"], "alice");
        assert_eq!(frame["chat_id"], "c1");
    }
    assert_eq!(app.backend.calls(), vec!["send:c1:alice:hi bob"]);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let app = TestApp::spawn(backend()).await;
    let mut bob = app.connect("c1", "bob").await;
    let mut carol = app.connect("c2", "carol").await;

    send_json(&mut carol, json!({"type": "text", "content": "only c2"})).await;

    assert_eq!(next_json(&mut carol).await["content"], "only c2");
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_edit_unsends_then_resends() {
    let app = TestApp::spawn(backend()).await;
    let mut alice = app.connect("c1", "alice").await;
    let mut bob = app.connect("c1", "bob").await;

    send_json(
        &mut alice,
        json!({"type": "edit", "message_id": "m-9", "content": "fixed"}),
    )
    .await;

    let frame = next_json(&mut bob).await;
    assert_eq!(frame["type"], "edit");
    assert_eq!(frame["message_id"], "m-1");
    assert_eq!(frame["original_id"], "m-9");
    assert_eq!(frame["is_edited"], true);
    assert_eq!(next_json(&mut alice).await["message_id"], "m-1");
    assert_eq!(
        app.backend.calls(),
        vec!["unsend:c1:alice:m-9", "send:c1:alice:fixed"]
    );
}

#[tokio::test]
async fn test_unknown_type_errors_only_the_sender() {
    let app = TestApp::spawn(backend()).await;
    let mut alice = app.connect("c1", "alice").await;
    let mut bob = app.connect("c1", "bob").await;

    send_json(&mut alice, json!({"type": "shout", "content": "hey"})).await;

    let frame = next_json(&mut alice).await;
    assert_eq!(frame["type"], "error");
    assert_eq!(frame["error"], "invalid_type");
    assert_silent(&mut alice).await;
    assert_silent(&mut bob).await;
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_connection_check_answered_privately() {
    let app = TestApp::spawn(backend()).await;
    let mut alice = app.connect("c1", "alice").await;
    let mut bob = app.connect("c1", "bob").await;

    send_json(&mut alice, json!({"type": "connection_check"})).await;

    let frame = next_json(&mut alice).await;
    assert_eq!(frame["type"], "connection_ack");
    assert_eq!(frame["message"], "Connection is active");
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_spoofed_sender_rejected() {
    let app = TestApp::spawn(backend()).await;
    let mut alice = app.connect("c1", "alice").await;

    send_json(
        &mut alice,
        json!({"type": "text", "content": "as bob", "user_id": "bob"}),
    )
    .await;

    assert_eq!(next_json(&mut alice).await["error"], "unauthorized");
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_non_participant_refused_before_upgrade() {
    let app = TestApp::spawn(backend()).await;
    let url = app.ws_url("c1", &token_for("mallory"));

    let err = tokio_tungstenite::connect_async(url).await.unwrap_err();

    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), StatusCode::FORBIDDEN)
        }
        other => panic!("expected HTTP refusal, got {:?}", other),
    }
    assert_eq!(app.state.hub.connection_count(), 0);
}

#[tokio::test]
async fn test_upgrade_without_token_is_unauthorized() {
    let app = TestApp::spawn(backend()).await;
    let url = format!("ws://{}/ws/chats/c1", app.addr);

    let err = tokio_tungstenite::connect_async(url).await.unwrap_err();

    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
        }
        other => panic!("expected HTTP refusal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_unregisters() {
    let app = TestApp::spawn(backend()).await;
    let alice = app.connect("c1", "alice").await;
    assert_eq!(app.state.hub.connection_count(), 1);

    drop(alice);

    assert!(app.wait_for_connections(0, Duration::from_secs(1)).await);
    assert_eq!(app.state.hub.room_count(), 0);
}

fn keepalive_settings(read_deadline_secs: u64, ping_interval_secs: u64) -> Settings {
    let mut settings = test_settings();
    settings.websocket.read_deadline_secs = read_deadline_secs;
    settings.websocket.ping_interval_secs = ping_interval_secs;
    settings.websocket.write_deadline_secs = 1;
    settings
}

#[tokio::test]
async fn test_silent_peer_dropped_after_read_deadline() {
    let app = TestApp::spawn_with(keepalive_settings(2, 1), backend()).await;
    let mut alice = app.connect("c1", "alice").await;

    // Not polling the socket means pings queue up unanswered
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(app.state.hub.connection_count(), 1);
    assert!(app.wait_for_connections(0, Duration::from_secs(3)).await);
    assert_eq!(app.state.hub.room_count(), 0);

    let mut saw_ping = false;
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match alice.next().await {
                Some(Ok(Message::Ping(_))) => saw_ping = true,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket stayed open after unregister");
    assert!(saw_ping);
}

#[tokio::test]
async fn test_answered_pings_keep_connection_alive() {
    let app = TestApp::spawn_with(keepalive_settings(2, 1), backend()).await;
    let mut alice = app.connect("c1", "alice").await;

    // Reading lets the client answer each ping with a pong
    let mut pings = 0;
    let _ = tokio::time::timeout(Duration::from_secs(4), async {
        while let Some(Ok(message)) = alice.next().await {
            if matches!(message, Message::Ping(_)) {
                pings += 1;
            }
        }
    })
    .await;

    assert!(pings >= 2, "expected keepalive pings, saw {}", pings);
    assert_eq!(app.state.hub.connection_count(), 1);
}

#[tokio::test]
async fn test_stalled_writer_stops_reads_and_unregisters() {
    // Long read deadline so only the write side can end the connection
    let app = TestApp::spawn_with(keepalive_settings(60, 30), backend()).await;
    let _alice = app.connect("c1", "alice").await;

    // The client never reads, so socket buffers fill and a flush overruns
    let chunk = Frame::from("x".repeat(64 * 1024));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while app.state.hub.connection_count() > 0 && tokio::time::Instant::now() < deadline {
        app.state.hub.broadcast("c1", chunk.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(app.state.hub.connection_count(), 0);
    assert_eq!(app.state.hub.room_count(), 0);
}
