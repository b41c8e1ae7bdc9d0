//! HTTP Layer
//!
//! Router plus the health and chat REST handlers.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
