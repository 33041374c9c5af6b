//! dlcount-pool — pooled connections to the key-value store.
//!
//! The pool hands out exclusively-owned connections that are already
//! authenticated and pointed at the configured database. It grows in
//! batches (a large initial batch, smaller refills) and only closes a
//! connection when a borrower drops it instead of releasing it.
//!
//! # Architecture
//!
//! ```text
//! acquire()  → take a borrower permit (bounded wait) or error
//!   → idle connection available → pop and return it
//!   → pool empty                → connect a refill batch, return one
//! release(conn) → push back onto the idle stack, free the permit
//! drop(conn)    → close the connection, free the permit
//! ```
//!
//! Connection establishment goes through a [`ConnectionFactory`], so tests
//! and local runs can swap the Redis backend for [`memory::MemoryStore`].

pub mod connection;
pub mod error;
pub mod memory;
pub mod pool;
pub mod redis;

pub use connection::{ConnectionFactory, StoreConnection, StoreTarget};
pub use error::{PoolError, PoolResult, StoreError, StoreResult};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use self::redis::{RedisConnection, RedisConnectionFactory};
