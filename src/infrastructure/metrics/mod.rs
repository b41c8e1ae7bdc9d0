//! Prometheus Metrics Module
//!
//! Provides gateway-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active socket connection gauge
//! - Outbound frames dropped, by reason
//! - Room broadcasts and rate-limited requests
//! - Backend call latency histograms, by operation and outcome
//! - Connection pool occupancy, by backend service

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::domain::BackendError;

const NAMESPACE: &str = "chat_gateway";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active socket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of registered socket connections",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Outbound frames that never reached a connection's queue
pub static FRAMES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("frames_dropped_total", "Outbound frames dropped before queueing")
            .namespace(NAMESPACE),
        &["reason"], // "queue_full", "closed"
    )
    .expect("Failed to create FRAMES_DROPPED_TOTAL metric")
});

/// Room broadcasts
pub static BROADCASTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("broadcasts_total", "Frames broadcast to a room").namespace(NAMESPACE),
    )
    .expect("Failed to create BROADCASTS_TOTAL metric")
});

/// Requests rejected by the token-bucket limiter
pub static RATE_LIMITED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("rate_limited_total", "Requests rejected by the rate limiter")
            .namespace(NAMESPACE),
    )
    .expect("Failed to create RATE_LIMITED_TOTAL metric")
});

/// Backend call duration histogram
pub static BACKEND_CALL_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new(
            "backend_call_duration_seconds",
            "Backend RPC latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["operation", "outcome"],
    )
    .expect("Failed to create BACKEND_CALL_DURATION_SECONDS metric")
});

/// Backend connection pool stats
pub static POOL_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("pool_connections", "Backend connection pool statistics").namespace(NAMESPACE),
        &["service", "state"], // state: "idle", "open"
    )
    .expect("Failed to create POOL_CONNECTIONS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(FRAMES_DROPPED_TOTAL.clone()))
        .expect("Failed to register FRAMES_DROPPED_TOTAL");
    registry
        .register(Box::new(BROADCASTS_TOTAL.clone()))
        .expect("Failed to register BROADCASTS_TOTAL");
    registry
        .register(Box::new(RATE_LIMITED_TOTAL.clone()))
        .expect("Failed to register RATE_LIMITED_TOTAL");
    registry
        .register(Box::new(BACKEND_CALL_DURATION_SECONDS.clone()))
        .expect("Failed to register BACKEND_CALL_DURATION_SECONDS");
    registry
        .register(Box::new(POOL_CONNECTIONS.clone()))
        .expect("Failed to register POOL_CONNECTIONS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to update the socket connection count
pub fn set_websocket_connections(connected: usize) {
    WEBSOCKET_CONNECTIONS_ACTIVE.set(connected as i64);
}

/// Helper to count frames that were not queued
pub fn record_frames_dropped(reason: &str, count: usize) {
    if count > 0 {
        FRAMES_DROPPED_TOTAL
            .with_label_values(&[reason])
            .inc_by(count as u64);
    }
}

pub fn record_broadcast() {
    BROADCASTS_TOTAL.inc();
}

pub fn record_rate_limited() {
    RATE_LIMITED_TOTAL.inc();
}

/// Helper to record backend call metrics
pub fn record_backend_call<T>(
    operation: &str,
    result: &Result<T, BackendError>,
    elapsed: Duration,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    BACKEND_CALL_DURATION_SECONDS
        .with_label_values(&[operation, outcome])
        .observe(elapsed.as_secs_f64());
}

/// Helper to update pool stats
pub fn set_pool_connections(service: &str, idle: usize, open: usize) {
    POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle as i64);
    POOL_CONNECTIONS
        .with_label_values(&[service, "open"])
        .set(open as i64);
}
