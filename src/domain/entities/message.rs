//! Chat message entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message as stored by the community service.
///
/// Immutable once delivered except for the flags, which change only through
/// explicit delete/unsend operations. Edits are an unsend followed by a
/// fresh send, so an edited message has a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub unsent: bool,
    pub deleted_for_all: bool,
    pub deleted_for_sender: bool,
}

impl ChatMessage {
    /// The backend has no read receipts per message; an unsent message
    /// counts as unread.
    pub fn is_read(&self) -> bool {
        !self.unsent
    }

    /// Whether viewers should redact the content.
    pub fn is_deleted(&self) -> bool {
        self.deleted_for_all || self.deleted_for_sender
    }
}

impl Default for ChatMessage {
    fn default() -> Self {
        Self {
            id: String::new(),
            chat_id: String::new(),
            sender_id: String::new(),
            content: String::new(),
            sent_at: Utc::now(),
            unsent: false,
            deleted_for_all: false,
            deleted_for_sender: false,
        }
    }
}
