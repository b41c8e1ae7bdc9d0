//! Chat Handlers
//!
//! Thin REST callers of the chat backend for clients that need history or
//! want to open a chat before connecting a socket.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{Chat, ChatMessage, NewChat};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Create chat request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub is_group: bool,

    #[serde(default)]
    #[validate(length(max = 100, message = "Chat name must be at most 100 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 500, message = "Chats need 1-500 other participants"))]
    pub participant_ids: Vec<String>,
}

/// Message history query parameters
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MessageQuery {
    /// `(limit, offset)` with the limit clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page(&self) -> (u32, u32) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0))
    }
}

/// Message as returned by the history endpoint
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: i64,
    pub is_read: bool,
    pub is_deleted: bool,
}

impl From<ChatMessage> for MessageResponse {
    fn from(message: ChatMessage) -> Self {
        let is_read = message.is_read();
        let is_deleted = message.is_deleted();
        Self {
            content: if is_deleted { String::new() } else { message.content },
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            timestamp: message.sent_at.timestamp(),
            is_read,
            is_deleted,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ParticipantsResponse {
    pub chat_id: String,
    pub participant_ids: Vec<String>,
}

/// Create a chat with the caller as creator
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), AppError> {
    body.validate().map_err(validation_error)?;

    let chat = state
        .backend
        .create_chat(NewChat {
            is_group: body.is_group,
            name: body.name,
            participant_ids: body.participant_ids,
            created_by: auth.user_id,
        })
        .await?;

    tracing::info!(chat_id = %chat.id, created_by = %chat.created_by, "Chat created");
    Ok((StatusCode::CREATED, Json(chat)))
}

/// Get a page of chat history
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    require_participant(&state, &chat_id, &auth).await?;

    let (limit, offset) = query.page();
    let messages = state.backend.list_messages(&chat_id, limit, offset).await?;

    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

/// List the chat's participants
pub async fn get_participants(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(chat_id): Path<String>,
) -> Result<Json<ParticipantsResponse>, AppError> {
    let participant_ids = state.backend.list_participants(&chat_id).await?;
    if !participant_ids.iter().any(|id| id == &auth.user_id) {
        return Err(not_a_participant());
    }

    Ok(Json(ParticipantsResponse {
        chat_id,
        participant_ids,
    }))
}

async fn require_participant(
    state: &AppState,
    chat_id: &str,
    auth: &AuthUser,
) -> Result<(), AppError> {
    if state.backend.is_participant(chat_id, &auth.user_id).await? {
        Ok(())
    } else {
        Err(not_a_participant())
    }
}

fn not_a_participant() -> AppError {
    AppError::Forbidden("You are not a participant of this chat".into())
}
