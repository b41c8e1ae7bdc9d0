//! Presentation Layer
//!
//! HTTP routes, edge middleware and the WebSocket relay.

pub mod http;
pub mod middleware;
pub mod websocket;
