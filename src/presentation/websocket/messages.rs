//! WebSocket Message Types
//!
//! JSON frames exchanged with chat clients. The same [`ChatFrame`] shape is
//! used in both directions; errors and control frames have their own shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Frame types the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Typing,
    Read,
    Edit,
    Delete,
    /// Liveness probe answered privately
    ConnectionCheck,
}

impl FrameKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "text" => Some(Self::Text),
            "typing" => Some(Self::Typing),
            "read" => Some(Self::Read),
            "edit" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            "connection_check" => Some(Self::ConnectionCheck),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Typing => "typing",
            Self::Read => "read",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::ConnectionCheck => "connection_check",
        }
    }
}

/// A chat frame, inbound or outbound.
///
/// `type` is kept as a string so unknown types still decode and can be
/// rejected with a specific error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub chat_id: String,
    /// Seconds since the epoch
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
    /// Backend-assigned id on replies; a client temporary id on requests
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    /// The id the client sent, or the edited message's previous id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_read: bool,
}

impl ChatFrame {
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Above this a numeric timestamp is taken to be in milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Accept seconds, milliseconds, numeric strings and RFC 3339 strings.
/// Missing, null and empty values become 0.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let seconds = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom("timestamp out of range"))?,
        Some(Value::String(s)) if s.trim().is_empty() => 0,
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.timestamp())
                .map_err(|e| D::Error::custom(format!("invalid timestamp: {}", e)))?,
        },
        Some(other) => {
            return Err(D::Error::custom(format!(
                "timestamp must be a number or string, got {}",
                other
            )))
        }
    };

    Ok(if seconds > MILLIS_THRESHOLD {
        seconds / 1000
    } else {
        seconds
    })
}

/// Error frame, sent only to the connection that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
    pub message: String,
}

impl ErrorFrame {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: "error".into(),
            error: code.into(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","error":"server_error","message":"internal error"}"#.to_string()
        })
    }
}

/// Greeting and connection-check acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub chat_id: String,
    pub user_id: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ControlFrame {
    pub fn established(chat_id: &str, user_id: &str) -> Self {
        Self {
            kind: "connection_established".into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now().timestamp(),
            message: None,
        }
    }

    pub fn ack(chat_id: &str, user_id: &str) -> Self {
        Self {
            kind: "connection_ack".into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now().timestamp(),
            message: Some("Connection is active".into()),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
