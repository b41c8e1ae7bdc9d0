//! Backend service facade.
//!
//! The `ChatBackend` trait is the whole contract the gateway needs from the
//! community and user services. Implementations translate transport failures
//! into one of the [`ErrorKind`]s below so callers never see transport types.

use std::fmt;

use async_trait::async_trait;

use super::entities::{Chat, ChatMessage, NewChat};

/// Error taxonomy shared by every backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Chat, message or user absent
    NotFound,
    /// Sender mismatch or non-participant
    PermissionDenied,
    /// Malformed or missing input
    InvalidInput,
    /// Pool exhausted, backend unreachable or timed out
    Unavailable,
    /// Unexpected translation or serialization failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidInput => "invalid_input",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed backend operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    kind: ErrorKind,
    message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether a client may reasonably resend after this failure.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Unavailable
    }
}

/// Domain operations the relay and HTTP handlers call.
///
/// Every call borrows a pooled handle, runs under a bounded timeout and
/// returns the handle on every exit path. No call is retried at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Persist a message and return the backend-assigned id.
    async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<String, BackendError>;

    /// Page through a chat's messages, newest first.
    async fn list_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, BackendError>;

    async fn mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError>;

    /// Replace a message's content.
    ///
    /// The backend has no in-place edit: the old message is unsent and the
    /// new content is sent as a fresh message, whose id is returned.
    async fn edit_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<String, BackendError> {
        self.unsend_message(chat_id, user_id, message_id).await?;
        self.send_message(chat_id, user_id, content).await
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError>;

    async fn unsend_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError>;

    async fn create_chat(&self, chat: NewChat) -> Result<Chat, BackendError>;

    /// `Ok(false)` when the user does not exist; `Err` only when the user
    /// service could not answer.
    async fn validate_user(&self, user_id: &str) -> Result<bool, BackendError>;

    async fn is_participant(&self, chat_id: &str, user_id: &str) -> Result<bool, BackendError> {
        Ok(self
            .list_participants(chat_id)
            .await?
            .iter()
            .any(|id| id == user_id))
    }

    async fn list_participants(&self, chat_id: &str) -> Result<Vec<String>, BackendError>;
}
