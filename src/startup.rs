//! Application Startup
//!
//! Component construction and server initialization. Every shared component
//! (hub, limiter, pools) is built here once and handed to the router.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::domain::ChatBackend;
use crate::infrastructure::GrpcChatBackend;
use crate::presentation::http::{handlers::health, routes};
use crate::presentation::middleware::{
    create_cors_layer, create_trace_layer, LimiterConfig, RateLimiter,
};
use crate::presentation::websocket::{ConnectionConfig, Dispatcher, Hub};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
    /// The gRPC facade when running against real services, for pool stats
    pub grpc: Option<Arc<GrpcChatBackend>>,
    pub hub: Arc<Hub>,
    pub limiter: Arc<RateLimiter>,
    pub dispatcher: Dispatcher,
    pub connection: ConnectionConfig,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        backend: Arc<dyn ChatBackend>,
        grpc: Option<Arc<GrpcChatBackend>>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(backend.clone()),
            backend,
            grpc,
            hub: Arc::new(Hub::new()),
            limiter: Arc::new(RateLimiter::new(LimiterConfig::from(&settings.rate_limit))),
            connection: ConnectionConfig::from(&settings.websocket),
            settings: Arc::new(settings),
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application from settings, dialing the gRPC backends lazily
    pub async fn build(settings: Settings) -> Result<Self> {
        let grpc = Arc::new(GrpcChatBackend::from_settings(&settings));
        tracing::info!(
            community = %settings.services.community,
            user = %settings.services.user,
            "Backend pools created"
        );

        let backend: Arc<dyn ChatBackend> = grpc.clone();
        Self::bind(AppState::new(settings, backend, Some(grpc))).await
    }

    /// Build against an arbitrary backend
    pub async fn build_with_backend(
        settings: Settings,
        backend: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        Self::bind(AppState::new(settings, backend, None)).await
    }

    async fn bind(state: AppState) -> Result<Self> {
        health::init_server_start();

        // Build router with middleware
        let router = routes::create_router(state.clone())
            .layer(create_trace_layer())
            .layer(create_cors_layer(&state.settings.cors));

        let addr = state.settings.server_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    /// Run the server until ctrl-c
    pub async fn run_until_stopped(self) -> Result<()> {
        let grpc = self.state.grpc.clone();

        axum::serve(
            self.listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        if let Some(grpc) = grpc {
            grpc.close();
            tracing::info!("Backend pools closed");
        }
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
