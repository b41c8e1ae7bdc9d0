//! WebSocket Upgrade Handler
//!
//! Authorizes the caller for the chat before upgrading, then hands the
//! socket to the connection loops.

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
    Extension,
};

use super::connection::run_connection;
use super::dispatch::ConnectionContext;
use super::hub::ConnectionId;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// `GET /ws/chats/{chat_id}`
///
/// Non-participants get 403 and no socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response, AppError> {
    if !state.backend.is_participant(&chat_id, &user.user_id).await? {
        tracing::info!(user_id = %user.user_id, chat_id = %chat_id, "Upgrade refused: not a participant");
        return Err(AppError::Forbidden(
            "You are not a participant of this chat".into(),
        ));
    }

    let ctx = ConnectionContext {
        connection_id: ConnectionId::new(),
        user_id: user.user_id,
        chat_id,
    };
    let hub = state.hub.clone();
    let dispatcher = state.dispatcher.clone();
    let config = state.connection;

    tracing::debug!(connection_id = %ctx.connection_id, "Upgrading connection");

    Ok(ws
        .max_message_size(config.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, hub, dispatcher, ctx, config)))
}
