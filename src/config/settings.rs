//! Gateway settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Backend service addresses
    pub services: ServiceSettings,

    /// Connection pool limits shared by every backend pool
    pub pool: PoolSettings,

    /// Per-call backend timeouts
    pub rpc: RpcSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// Rate limiting configuration
    pub rate_limit: RateLimitSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket configuration
    pub websocket: WebSocketSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// Backend service targets, as `host:port`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Community service (chats, participants, messages)
    pub community: String,

    /// User service (existence checks)
    pub user: String,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Idle handles retained per backend; extra handles are closed on return
    pub max_idle: usize,

    /// Soft cap on open handles per backend; exceeding it is logged, not refused
    pub max_open: usize,

    /// Dial timeout for a new handle, in milliseconds
    pub dial_timeout_ms: u64,
}

/// Backend call timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// Timeout for ordinary unary calls, in milliseconds
    pub call_timeout_ms: u64,

    /// Timeout for message listing, in milliseconds
    pub list_timeout_ms: u64,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key the auth service signs tokens with
    pub secret: String,
}

/// Token bucket configuration, applied per client address.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Bucket capacity
    pub max_tokens: f64,

    /// Refill rate
    pub tokens_per_second: f64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Outbound queue capacity per connection, in frames
    pub send_buffer_size: usize,

    /// Maximum inbound message size in bytes
    pub max_message_size: usize,

    /// Seconds without a pong before the connection is dropped
    pub read_deadline_secs: u64,

    /// Seconds allowed for a single flush to the socket
    pub write_deadline_secs: u64,

    /// Seconds between keepalive pings
    pub ping_interval_secs: u64,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if any value fails [`Settings::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let settings: Self = Self::defaults(Config::builder(), &environment)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__POOL__MAX_IDLE=5 -> pool.max_idle = 5
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "services.community",
                std::env::var("COMMUNITY_SERVICE_ADDR").ok(),
            )?
            .set_override_option("services.user", std::env::var("USER_SERVICE_ADDR").ok())?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8083)?
            .set_default("services.community", "localhost:9093")?
            .set_default("services.user", "localhost:50052")?
            .set_default("pool.max_idle", 5)?
            .set_default("pool.max_open", 20)?
            .set_default("pool.dial_timeout_ms", 10_000_i64)?
            .set_default("rpc.call_timeout_ms", 5_000_i64)?
            .set_default("rpc.list_timeout_ms", 10_000_i64)?
            // 20 requests, refilled at roughly 20 per minute
            .set_default("rate_limit.max_tokens", 20.0)?
            .set_default("rate_limit.tokens_per_second", 0.33)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.send_buffer_size", 256_i64)?
            .set_default("websocket.max_message_size", 4096_i64)?
            .set_default("websocket.read_deadline_secs", 60_i64)?
            .set_default("websocket.write_deadline_secs", 10_i64)?
            .set_default("websocket.ping_interval_secs", 54_i64)
    }

    /// Check cross-field constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters for security. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        if self.websocket.ping_interval_secs >= self.websocket.read_deadline_secs {
            return Err(ConfigError::Message(format!(
                "websocket.ping_interval_secs ({}) must be shorter than websocket.read_deadline_secs ({})",
                self.websocket.ping_interval_secs, self.websocket.read_deadline_secs
            )));
        }
        if self.websocket.send_buffer_size == 0 {
            return Err(ConfigError::Message(
                "websocket.send_buffer_size must be greater than zero".into(),
            ));
        }
        if self.pool.max_idle > self.pool.max_open {
            return Err(ConfigError::Message(format!(
                "pool.max_idle ({}) must not exceed pool.max_open ({})",
                self.pool.max_idle, self.pool.max_open
            )));
        }
        let limit = &self.rate_limit;
        let rate_ok = limit.tokens_per_second.is_finite() && limit.tokens_per_second > 0.0;
        let burst_ok = limit.max_tokens.is_finite() && limit.max_tokens >= 1.0;
        if !(rate_ok && burst_ok) {
            return Err(ConfigError::Message(format!(
                "rate_limit requires finite max_tokens >= 1 and finite tokens_per_second > 0 (got {} and {})",
                limit.max_tokens, limit.tokens_per_second
            )));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl PoolSettings {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

impl RpcSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }
}

impl WebSocketSettings {
    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_secs(self.write_deadline_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}
