//! # Chat Gateway Library
//!
//! This crate provides the edge gateway of a chat system:
//! - Per-chat WebSocket rooms relaying frames between participants
//! - A dispatch pipeline turning inbound frames into backend calls
//! - Pooled gRPC clients for the community and user services
//! - A token-bucket rate limiter and JWT authentication at the edge
//!
//! ## Architecture
//!
//! - **Domain Layer**: Chat entities and the backend facade trait
//! - **Infrastructure Layer**: Connection pools, gRPC clients, metrics
//! - **Presentation Layer**: HTTP handlers, middleware and the socket relay
//!
//! ## Module Structure
//!
//! ```text
//! chat_gateway/
//! +-- config/         Configuration management
//! +-- domain/         Entities and the ChatBackend facade
//! +-- infrastructure/ Pooled RPC client, facade implementation, metrics
//! +-- presentation/   HTTP routes, middleware and WebSocket relay
//! +-- shared/         Common utilities (errors, validation)
//! ```

// Configuration module
pub mod config;

// Domain layer - Entities and backend contract
pub mod domain;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
