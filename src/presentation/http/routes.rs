//! Route Configuration
//!
//! Configures all HTTP routes for the gateway.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{auth_middleware, rate_limit};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        .merge(socket_routes(state.clone()))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// Socket upgrade, rate limited before authentication
fn socket_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/ws/chats/{chat_id}", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(middleware::from_fn_with_state(state, rate_limit))
}

/// API v1 routes (protected)
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chats", post(handlers::chat::create_chat))
        .route("/chats/{chat_id}/messages", get(handlers::chat::get_messages))
        .route(
            "/chats/{chat_id}/participants",
            get(handlers::chat::get_participants),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route_layer(middleware::from_fn_with_state(state, rate_limit))
}
