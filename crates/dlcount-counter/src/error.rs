//! Error types for the counting path.

use dlcount_pool::{PoolError, StoreError};
use thiserror::Error;

/// Result type alias for counting operations.
pub type CountResult<T> = Result<T, CountError>;

/// Why a single download could not be counted.
///
/// Never reaches the HTTP response: [`crate::DownloadCounter::record`] logs
/// and drops it.
#[derive(Debug, Error)]
pub enum CountError {
    #[error("no store connection available: {0}")]
    Pool(#[from] PoolError),

    #[error("store command failed: {0}")]
    Store(#[from] StoreError),
}
