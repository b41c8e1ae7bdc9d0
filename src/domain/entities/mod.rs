//! # Domain Entities
//!
//! Entities the gateway relays between clients and the community service.
//! Persistence is owned by the backend; these are read models.
//!
//! - **ChatMessage**: A message with its delivery flags
//! - **Chat**: A direct or group conversation with its participants

mod chat;
mod message;

pub use chat::{Chat, NewChat};
pub use message::ChatMessage;
