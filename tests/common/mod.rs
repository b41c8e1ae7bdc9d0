//! Common Test Utilities
//!
//! Shared helpers, fixtures, and test infrastructure: a recording backend
//! stub, a `TestApp` serving the real router on an ephemeral port, token
//! minting and socket helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

use chat_gateway::config::{
    CorsSettings, JwtSettings, PoolSettings, RateLimitSettings, RpcSettings, ServerSettings,
    ServiceSettings, Settings, WebSocketSettings,
};
use chat_gateway::domain::{BackendError, Chat, ChatBackend, ChatMessage, NewChat};
use chat_gateway::presentation::middleware::Claims;
use chat_gateway::startup::{AppState, Application};

pub const JWT_SECRET: &str = "integration-test-secret-with-32-plus-chars";

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for a gateway bound to an ephemeral local port.
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        services: ServiceSettings {
            community: "127.0.0.1:1".into(),
            user: "127.0.0.1:1".into(),
        },
        pool: PoolSettings {
            max_idle: 2,
            max_open: 4,
            dial_timeout_ms: 500,
        },
        rpc: RpcSettings {
            call_timeout_ms: 500,
            list_timeout_ms: 1000,
        },
        jwt: JwtSettings {
            secret: JWT_SECRET.into(),
        },
        rate_limit: RateLimitSettings {
            max_tokens: 1000.0,
            tokens_per_second: 100.0,
        },
        cors: CorsSettings {
            allowed_origins: vec![],
        },
        websocket: WebSocketSettings {
            send_buffer_size: 64,
            max_message_size: 4096,
            read_deadline_secs: 60,
            write_deadline_secs: 10,
            ping_interval_secs: 54,
        },
        environment: "test".into(),
    }
}

/// Backend stub that records every call and answers from fixed data.
#[derive(Default)]
pub struct RecordingBackend {
    calls: Mutex<Vec<String>>,
    participants: Mutex<HashMap<String, Vec<String>>>,
    next_id: AtomicU64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chat with the given participants.
    pub fn with_chat(self, chat_id: &str, participants: &[&str]) -> Self {
        self.participants.lock().insert(
            chat_id.to_string(),
            participants.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ChatBackend for RecordingBackend {
    async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<String, BackendError> {
        self.record(format!("send:{}:{}:{}", chat_id, sender_id, content));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("m-{}", id))
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, BackendError> {
        self.record(format!("list:{}:{}:{}", chat_id, limit, offset));
        Ok(vec![ChatMessage {
            id: "m-1".into(),
            chat_id: chat_id.into(),
            sender_id: "alice".into(),
            content: "hello".into(),
            ..Default::default()
        }])
    }

    async fn mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError> {
        self.record(format!("read:{}:{}:{}", chat_id, user_id, message_id));
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError> {
        self.record(format!("delete:{}:{}:{}", chat_id, user_id, message_id));
        Ok(())
    }

    async fn unsend_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError> {
        self.record(format!("unsend:{}:{}:{}", chat_id, user_id, message_id));
        Ok(())
    }

    async fn create_chat(&self, chat: NewChat) -> Result<Chat, BackendError> {
        let participant_ids = chat.participants_with_creator();
        self.record(format!("create:{}", participant_ids.join(",")));
        Ok(Chat {
            id: "c-new".into(),
            name: chat.name,
            is_group: chat.is_group,
            created_by: chat.created_by,
            participant_ids,
            created_at: Utc::now(),
        })
    }

    async fn validate_user(&self, _user_id: &str) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn list_participants(&self, chat_id: &str) -> Result<Vec<String>, BackendError> {
        self.participants
            .lock()
            .get(chat_id)
            .cloned()
            .ok_or_else(|| BackendError::not_found("chat not found"))
    }
}

/// Test application serving the real router
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub backend: Arc<RecordingBackend>,
    router: Router,
}

impl TestApp {
    /// Spawn a gateway on an ephemeral port in front of `backend`
    pub async fn spawn(backend: RecordingBackend) -> Self {
        Self::spawn_with(test_settings(), backend).await
    }

    pub async fn spawn_with(settings: Settings, backend: RecordingBackend) -> Self {
        let backend = Arc::new(backend);
        let app = Application::build_with_backend(settings, backend.clone())
            .await
            .expect("failed to build application");
        let addr = app.local_addr().expect("no local address");
        let state = app.state().clone();
        let router = chat_gateway::presentation::http::create_router(state.clone());

        tokio::spawn(app.run_until_stopped());

        Self {
            addr,
            state,
            backend,
            router,
        }
    }

    /// Make a request against the router without a socket
    pub async fn request(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Make a GET request to the application
    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Make an authenticated GET request
    pub async fn get_auth(&self, uri: &str, token: &str) -> axum::response::Response {
        self.request(
            Request::builder()
                .uri(uri)
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json_auth(
        &self,
        uri: &str,
        body: &str,
        token: &str,
    ) -> axum::response::Response {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub fn ws_url(&self, chat_id: &str, token: &str) -> String {
        format!("ws://{}/ws/chats/{}?token={}", self.addr, chat_id, token)
    }

    /// Connect a socket and consume its greeting
    pub async fn connect(&self, chat_id: &str, user_id: &str) -> Socket {
        let url = self.ws_url(chat_id, &token_for(user_id));
        let (mut socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("upgrade failed");
        let greeting = next_json(&mut socket).await;
        assert_eq!(greeting["type"], "connection_established");
        socket
    }

    /// Poll the hub until it holds `expected` connections or `within` passes
    pub async fn wait_for_connections(&self, expected: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.state.hub.connection_count() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.state.hub.connection_count() == expected
    }
}

/// Mint a valid token for `user_id`
pub fn token_for(user_id: &str) -> String {
    let claims = Claims {
        user_id: Some(user_id.to_string()),
        exp: Utc::now().timestamp() + 3600,
        iat: Utc::now().timestamp(),
        ..Default::default()
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Read a response body as JSON
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame as JSON, skipping control frames
pub async fn next_json(socket: &mut Socket) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap();
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("unexpected socket event: {:?}", other),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Assert nothing arrives for a short while
pub async fn assert_silent(socket: &mut Socket) {
    let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(next.is_err(), "expected no frame, got {:?}", next);
}
