//! Chat entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A direct or group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub is_group: bool,
    pub created_by: String,
    pub participant_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChat {
    pub is_group: bool,
    pub name: String,
    pub participant_ids: Vec<String>,
    pub created_by: String,
}

impl NewChat {
    /// Participants with the creator included exactly once, order preserved.
    pub fn participants_with_creator(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.participant_ids.len() + 1);
        for id in std::iter::once(&self.created_by).chain(self.participant_ids.iter()) {
            if !id.is_empty() && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}
