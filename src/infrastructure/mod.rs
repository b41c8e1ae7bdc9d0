//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - The pooled gRPC transport to the community and user services
//! - The `ChatBackend` implementation on top of it
//! - Prometheus metrics

pub mod backend;
pub mod metrics;
pub mod rpc;

pub use backend::GrpcChatBackend;
