//! Rate Limiting Middleware
//!
//! In-process token buckets keyed by client address. Each key gets its own
//! bucket, created full on first sight and refilled lazily on access, so no
//! background task is needed.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::RateLimitSettings;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::startup::AppState;

// ============================================================================
// Rate Limit Configuration
// ============================================================================

/// Bucket shape shared by every key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    /// Bucket capacity; a new key may burst this many requests
    pub max_tokens: f64,
    /// Refill rate
    pub tokens_per_second: f64,
}

impl From<&RateLimitSettings> for LimiterConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            tokens_per_second: settings.tokens_per_second,
        }
    }
}

// ============================================================================
// Rate Limiter Implementation
// ============================================================================

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill for the time elapsed since the last access, then try to take
    /// one token. On denial returns the wait until a token is available.
    fn try_acquire(&mut self, now: Instant, config: &LimiterConfig) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.tokens_per_second).min(config.max_tokens);
        // Never move the clock backwards for out-of-order callers
        if now > self.last_refill {
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            // A vanishing refill rate can exceed what Duration holds
            Err(Duration::try_from_secs_f64(missing / config.tokens_per_second)
                .unwrap_or(Duration::MAX))
        }
    }
}

/// Token-bucket limiter keyed by client identifier.
///
/// Buckets are never evicted.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, Arc<Mutex<TokenBucket>>>,
    config: LimiterConfig,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Admit or deny one request for `key` now.
    pub fn allow(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).is_ok()
    }

    /// Admit or deny one request for `key` at `now`.
    ///
    /// `Err` carries how long until the next token is available.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        let bucket = match self.buckets.get(key) {
            Some(bucket) => Arc::clone(bucket.value()),
            None => Arc::clone(
                self.buckets
                    .entry(key.to_string())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(TokenBucket::new(self.config.max_tokens, now)))
                    })
                    .value(),
            ),
        };

        // The map shard lock is released; only this key's bucket is held
        let result = bucket.lock().try_acquire(now, &self.config);
        result
    }

    /// Number of keys seen so far.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    pub fn config(&self) -> LimiterConfig {
        self.config
    }
}

// ============================================================================
// Identifier Extraction
// ============================================================================

/// Extract the rate limit identifier from request headers.
///
/// Priority:
/// 1. First valid address in X-Forwarded-For (original client behind proxies)
/// 2. X-Real-IP (common with nginx)
/// 3. Peer address of the TCP connection
pub fn extract_identifier(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(forwarded_for) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(ip) = forwarded_for
            .split(',')
            .map(str::trim)
            .find_map(|candidate| candidate.parse::<IpAddr>().ok())
        {
            return format!("ip:{}", ip);
        }
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.trim().parse::<IpAddr>().ok())
    {
        return format!("ip:{}", ip);
    }

    match peer {
        Some(ip) => format!("ip:{}", ip),
        None => {
            tracing::warn!("Could not determine client identifier for rate limiting");
            "ip:unknown".to_string()
        }
    }
}

// ============================================================================
// Middleware Functions
// ============================================================================

/// Rate limiting middleware applied to every gateway route except health.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let identifier = extract_identifier(request.headers(), peer);

    match state.limiter.check_at(&identifier, Instant::now()) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(
                identifier = %identifier,
                path = %request.uri().path(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited();
            create_rate_limit_response(retry_after)
        }
    }
}

/// Create a 429 Too Many Requests response.
fn create_rate_limit_response(retry_after: Duration) -> Response {
    let mut response = AppError::RateLimited.into_response();

    // Round up so clients never retry early
    let seconds = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    if let Ok(v) = HeaderValue::from_str(&seconds.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, v);
    }

    response
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_tokens: f64, tokens_per_second: f64) -> RateLimiter {
        RateLimiter::new(LimiterConfig {
            max_tokens,
            tokens_per_second,
        })
    }

    #[test]
    fn test_new_key_may_burst_capacity() {
        let limiter = limiter(20.0, 0.33);
        let now = Instant::now();

        for _ in 0..20 {
            assert!(limiter.check_at("ip:10.0.0.1", now).is_ok());
        }
        assert!(limiter.check_at("ip:10.0.0.1", now).is_err());
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let limiter = limiter(2.0, 1.0);
        let t0 = Instant::now();

        assert!(limiter.check_at("k", t0).is_ok());
        assert!(limiter.check_at("k", t0).is_ok());
        assert!(limiter.check_at("k", t0).is_err());

        assert!(limiter.check_at("k", t0 + Duration::from_millis(500)).is_err());
        assert!(limiter.check_at("k", t0 + Duration::from_millis(1000)).is_ok());
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let limiter = limiter(3.0, 10.0);
        let t0 = Instant::now();
        assert!(limiter.check_at("k", t0).is_ok());

        let later = t0 + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(limiter.check_at("k", later).is_ok());
        }
        assert!(limiter.check_at("k", later).is_err());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1.0, 0.1);
        let now = Instant::now();

        assert!(limiter.check_at("ip:1.1.1.1", now).is_ok());
        assert!(limiter.check_at("ip:1.1.1.1", now).is_err());
        assert!(limiter.check_at("ip:2.2.2.2", now).is_ok());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_admitted_never_exceeds_capacity_plus_refill() {
        let (capacity, rate) = (20.0, 0.33);
        let limiter = limiter(capacity, rate);
        let t0 = Instant::now();
        let step = Duration::from_millis(50);
        let mut admitted = 0u32;

        // 10 seconds of requests every 50ms
        for i in 0..200u32 {
            let now = t0 + step * i;
            if limiter.check_at("k", now).is_ok() {
                admitted += 1;
            }
            let window = (step * i).as_secs_f64();
            assert!(f64::from(admitted) <= capacity + rate * window);
        }
        assert!(admitted >= 20);
    }

    #[test]
    fn test_denial_reports_wait_for_next_token() {
        let limiter = limiter(1.0, 0.5);
        let now = Instant::now();
        assert!(limiter.check_at("k", now).is_ok());

        let wait = limiter.check_at("k", now).unwrap_err();
        assert_eq!(wait, Duration::from_secs(2));
    }

    #[test]
    fn test_tiny_refill_rate_denies_without_overflow() {
        let limiter = limiter(1.0, 1e-20);
        let now = Instant::now();
        assert!(limiter.check_at("k", now).is_ok());

        let wait = limiter.check_at("k", now).unwrap_err();
        assert_eq!(wait, Duration::MAX);

        let response = create_rate_limit_response(wait);
        assert_eq!(response.headers()[header::RETRY_AFTER], u64::MAX.to_string().as_str());
    }

    #[test]
    fn test_identifier_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "garbage, 203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());

        let id = extract_identifier(&headers, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(id, "ip:203.0.113.7");
    }

    #[test]
    fn test_identifier_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(extract_identifier(&headers, None), "ip:198.51.100.2");

        let empty = HeaderMap::new();
        assert_eq!(
            extract_identifier(&empty, Some("127.0.0.1".parse().unwrap())),
            "ip:127.0.0.1"
        );
        assert_eq!(extract_identifier(&empty, None), "ip:unknown");
    }

    #[test]
    fn test_rate_limit_response_has_retry_after() {
        let response = create_rate_limit_response(Duration::from_millis(1500));
        assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }
}
