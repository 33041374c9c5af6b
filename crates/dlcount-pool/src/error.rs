//! Error types for store connections and the pool.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for single-connection store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by a store connection or while establishing one.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("command failed: {0}")]
    Command(String),
}

impl StoreError {
    /// Whether retrying the connection attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connect(_))
    }
}

/// Errors raised by [`crate::ConnectionPool::acquire`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to grow connection pool: {0}")]
    Store(#[from] StoreError),

    #[error("connection pool exhausted: {max_size} connections in use (waited {waited:?})")]
    Exhausted { max_size: usize, waited: Duration },
}
