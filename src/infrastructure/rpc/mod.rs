//! gRPC plumbing: wire messages, typed clients and the channel pool.

pub mod client;
pub mod pool;
pub mod proto;

pub use client::{CommunityClient, GrpcConnector, UserClient};
pub use pool::{ConnectionPool, Connector, PoolConfig, PoolError, PoolStats, PooledConnection};
