//! WebSocket Relay
//!
//! Per-chat rooms of live sockets, the read/write loops that serve them
//! and the pipeline that turns inbound frames into backend calls.

pub mod connection;
pub mod dispatch;
pub mod handler;
pub mod hub;
pub mod messages;

pub use connection::{run_connection, ConnectionConfig};
pub use dispatch::{ConnectionContext, Dispatch, DispatchError, Dispatcher};
pub use handler::ws_handler;
pub use hub::{BroadcastStats, ConnectionId, Frame, Hub, HubGuard};
pub use messages::{ChatFrame, ControlFrame, ErrorFrame, FrameKind};
