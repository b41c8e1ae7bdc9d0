//! Message Dispatch Pipeline
//!
//! Turns one inbound frame into either a room broadcast or a private reply.
//! Every failure becomes an error frame for the sender; nothing a single
//! frame does can reach other connections except a successful broadcast.

use std::sync::Arc;

use chrono::Utc;

use super::hub::ConnectionId;
use super::messages::{ChatFrame, ControlFrame, ErrorFrame, FrameKind};
use crate::domain::{BackendError, ChatBackend, ErrorKind};

/// Identity bound to a connection at upgrade time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub chat_id: String,
}

/// What to do with a handled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send to every connection in the sender's room, sender included
    Broadcast(String),
    /// Send only to the sender
    Reply(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed frame: {0}")]
    InvalidFormat(String),

    #[error("frame identity does not match the connection")]
    Unauthorized,

    #[error("unsupported frame type: {0}")]
    InvalidType(String),

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DispatchError {
    /// Code carried in the `error` field of the error frame.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => "invalid_format",
            Self::Unauthorized => "unauthorized",
            Self::InvalidType(_) => "invalid_type",
            Self::InvalidInput(_) => "invalid_input",
            Self::Backend(e) => match e.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::PermissionDenied => "permission_denied",
                ErrorKind::InvalidInput => "invalid_input",
                ErrorKind::Unavailable => "unavailable",
                ErrorKind::Internal => "server_error",
            },
            Self::Encode(_) => "server_error",
        }
    }

    pub fn to_frame(&self) -> String {
        let message = match self {
            Self::Backend(e) if e.kind() == ErrorKind::Internal => "internal error".to_string(),
            Self::Backend(e) if e.is_retryable() => {
                "service temporarily unavailable, please retry".to_string()
            }
            Self::Backend(e) => e.message().to_string(),
            Self::Encode(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        ErrorFrame::new(self.code(), message).encode()
    }
}

fn require<'a>(value: &'a str, missing: &'static str) -> Result<&'a str, DispatchError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::InvalidInput(missing));
    }
    Ok(trimmed)
}

/// Frame handler shared by every connection.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn ChatBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Handle one raw frame from the connection described by `ctx`.
    pub async fn dispatch(&self, raw: &[u8], ctx: &ConnectionContext) -> Dispatch {
        match self.handle(raw, ctx).await {
            Ok(dispatch) => dispatch,
            Err(e) => {
                match e.code() {
                    "server_error" => {
                        tracing::error!(connection_id = %ctx.connection_id, error = %e, "Frame failed");
                    }
                    _ => {
                        tracing::debug!(
                            connection_id = %ctx.connection_id,
                            code = e.code(),
                            error = %e,
                            "Frame rejected"
                        );
                    }
                }
                Dispatch::Reply(e.to_frame())
            }
        }
    }

    async fn handle(&self, raw: &[u8], ctx: &ConnectionContext) -> Result<Dispatch, DispatchError> {
        let mut frame =
            ChatFrame::decode(raw).map_err(|e| DispatchError::InvalidFormat(e.to_string()))?;

        // Frames may omit identity; the connection's binding fills it in
        if frame.user_id.is_empty() {
            frame.user_id = ctx.user_id.clone();
        }
        if frame.chat_id.is_empty() {
            frame.chat_id = ctx.chat_id.clone();
        }
        if frame.user_id != ctx.user_id || frame.chat_id != ctx.chat_id {
            return Err(DispatchError::Unauthorized);
        }
        if frame.timestamp == 0 {
            frame.timestamp = Utc::now().timestamp();
        }

        let kind = FrameKind::parse(&frame.kind)
            .ok_or_else(|| DispatchError::InvalidType(frame.kind.clone()))?;
        tracing::debug!(
            connection_id = %ctx.connection_id,
            kind = kind.as_str(),
            "Dispatching frame"
        );

        let chat_id = ctx.chat_id.as_str();
        let user_id = ctx.user_id.as_str();

        match kind {
            FrameKind::Text => {
                let content = require(&frame.content, "content is required")?.to_string();
                let id = self.backend.send_message(chat_id, user_id, &content).await?;
                // Viewers see exactly what was stored
                frame.content = content;
                frame.original_id = std::mem::take(&mut frame.message_id);
                frame.message_id = id;
            }
            FrameKind::Typing => {
                frame.content.clear();
            }
            FrameKind::Read => {
                let message_id = require(&frame.message_id, "message_id is required")?;
                self.backend.mark_read(chat_id, user_id, message_id).await?;
                frame.is_read = true;
            }
            FrameKind::Edit => {
                let message_id = require(&frame.message_id, "message_id is required")?;
                let message_id = message_id.to_string();
                let content = require(&frame.content, "content is required")?.to_string();
                let id = self
                    .backend
                    .edit_message(chat_id, user_id, &message_id, &content)
                    .await?;
                frame.content = content;
                frame.original_id = std::mem::replace(&mut frame.message_id, id);
                frame.is_edited = true;
            }
            FrameKind::Delete => {
                let message_id = require(&frame.message_id, "message_id is required")?;
                self.backend.delete_message(chat_id, user_id, message_id).await?;
                frame.content.clear();
                frame.is_deleted = true;
            }
            FrameKind::ConnectionCheck => {
                return Ok(Dispatch::Reply(ControlFrame::ack(chat_id, user_id).encode()?));
            }
        }

        frame.sender_id = Some(ctx.user_id.clone());
        Ok(Dispatch::Broadcast(frame.encode()?))
    }
}
