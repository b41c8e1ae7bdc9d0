//! Bounded pool of reusable backend handles.
//!
//! Handles are borrowed with [`ConnectionPool::get`] and go back to the idle
//! queue when the [`PooledConnection`] guard drops. Borrowing never blocks on
//! other borrowers: an empty idle queue means a fresh dial.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::PoolSettings;
use crate::domain::BackendError;
use crate::infrastructure::metrics;

/// Pool failures. All of them surface to callers as "unavailable".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("connecting to {address} timed out after {timeout:?}")]
    DialTimeout { address: String, timeout: Duration },

    #[error("connection pool for {address} is closed")]
    Closed { address: String },
}

impl From<PoolError> for BackendError {
    fn from(err: PoolError) -> Self {
        BackendError::unavailable(err.to_string())
    }
}

/// Opens new handles to one backend address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self, address: &str) -> Result<Self::Connection, PoolError>;
}

/// Pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Handles kept for reuse; extras are closed on return
    pub max_idle: usize,
    /// Soft cap on handles in existence, idle or borrowed
    pub max_open: usize,
    pub dial_timeout: Duration,
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            max_idle: settings.max_idle,
            max_open: settings.max_open,
            dial_timeout: settings.dial_timeout(),
        }
    }
}

/// Point-in-time pool occupancy, reported by the readiness probe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub service: String,
    pub address: String,
    pub idle: usize,
    pub open: usize,
    pub closed: bool,
}

struct PoolInner<C: Connector> {
    service: String,
    address: String,
    connector: C,
    config: PoolConfig,
    idle: Mutex<VecDeque<C::Connection>>,
    open: AtomicUsize,
    closed: AtomicBool,
}

impl<C: Connector> PoolInner<C> {
    fn release(&self, conn: C::Connection) {
        let rejected = {
            let mut idle = self.idle.lock();
            if self.closed.load(Ordering::Acquire) || idle.len() >= self.config.max_idle {
                Some(conn)
            } else {
                idle.push_back(conn);
                None
            }
        };

        // Close outside the lock
        if let Some(conn) = rejected {
            drop(conn);
            self.open.fetch_sub(1, Ordering::AcqRel);
        }
        self.report();
    }

    fn forget(&self, conn: C::Connection) {
        drop(conn);
        self.open.fetch_sub(1, Ordering::AcqRel);
        self.report();
    }

    fn report(&self) {
        metrics::set_pool_connections(
            &self.service,
            self.idle.lock().len(),
            self.open.load(Ordering::Acquire),
        );
    }
}

/// Shared pool handle. Clones refer to the same pool.
pub struct ConnectionPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(
        service: impl Into<String>,
        address: impl Into<String>,
        connector: C,
        config: PoolConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                service: service.into(),
                address: address.into(),
                connector,
                config,
                idle: Mutex::new(VecDeque::with_capacity(config.max_idle)),
                open: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Borrow a handle: reuse an idle one if available, otherwise dial.
    ///
    /// # Errors
    ///
    /// `Closed` after [`close`](Self::close), `DialTimeout` when the dial
    /// exceeds the configured timeout, `Connect` when the dial fails.
    pub async fn get(&self) -> Result<PooledConnection<C>, PoolError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed {
                address: inner.address.clone(),
            });
        }

        let reused = inner.idle.lock().pop_front();
        if let Some(conn) = reused {
            return Ok(self.wrap(conn));
        }

        let open = inner.open.fetch_add(1, Ordering::AcqRel) + 1;
        if open > inner.config.max_open {
            tracing::warn!(
                service = %inner.service,
                open,
                max_open = inner.config.max_open,
                "Connection pool over its open limit, dialing anyway"
            );
        }

        let dialed = tokio::time::timeout(
            inner.config.dial_timeout,
            inner.connector.connect(&inner.address),
        )
        .await;

        match dialed {
            Ok(Ok(conn)) => {
                tracing::debug!(service = %inner.service, address = %inner.address, "Dialed backend");
                let conn = self.wrap(conn);
                inner.report();
                Ok(conn)
            }
            Ok(Err(e)) => {
                inner.open.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(service = %inner.service, error = %e, "Backend dial failed");
                Err(e)
            }
            Err(_) => {
                inner.open.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(
                    service = %inner.service,
                    timeout = ?inner.config.dial_timeout,
                    "Backend dial timed out"
                );
                Err(PoolError::DialTimeout {
                    address: inner.address.clone(),
                    timeout: inner.config.dial_timeout,
                })
            }
        }
    }

    /// Stop pooling. Idle handles are closed now; borrowed ones are closed
    /// when their guards drop.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<_> = inner.idle.lock().drain(..).collect();
        inner.open.fetch_sub(drained.len(), Ordering::AcqRel);
        drop(drained);
        inner.report();
        tracing::info!(service = %inner.service, "Connection pool closed");
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    pub fn open_count(&self) -> usize {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            service: self.inner.service.clone(),
            address: self.inner.address.clone(),
            idle: self.idle_count(),
            open: self.open_count(),
            closed: self.is_closed(),
        }
    }

    fn wrap(&self, conn: C::Connection) -> PooledConnection<C> {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
        }
    }
}

/// A borrowed handle. Returned to the pool on drop.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    pool: Arc<PoolInner<C>>,
}

impl<C: Connector> PooledConnection<C> {
    /// Close the handle instead of returning it, for handles known broken.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.forget(conn);
        }
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the handle, and both consume the guard
        match self.conn.as_ref() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.conn.as_mut() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
