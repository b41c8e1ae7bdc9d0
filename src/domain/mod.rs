//! # Domain Layer
//!
//! The domain layer holds what the gateway knows about chats independent of
//! any transport: the entities relayed to clients and the backend facade
//! contract the relay and HTTP handlers call.
//!
//! ## Structure
//!
//! - **entities**: Chat messages and chats as the gateway sees them
//! - **backend**: The `ChatBackend` facade trait and its error taxonomy
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - The facade trait defines the backend contract; gRPC lives in infrastructure

pub mod backend;
pub mod entities;

// Re-export commonly used types
pub use backend::{BackendError, ChatBackend, ErrorKind};
pub use entities::*;
