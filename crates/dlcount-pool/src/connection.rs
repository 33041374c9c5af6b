//! Store connection and factory traits.
//!
//! The counter only needs three commands: `SELECT db`, `HGET key field` and
//! `HSET key field value`. Backends implement [`StoreConnection`]; the pool
//! creates them through a [`ConnectionFactory`].

use async_trait::async_trait;
use dlcount_core::config::RedisSection;

use crate::error::StoreResult;

/// An open, authenticated connection to the key-value store.
///
/// Owned by at most one borrower at a time, so methods take `&mut self`.
#[async_trait]
pub trait StoreConnection: Send + std::fmt::Debug {
    /// Point this connection at database `db`.
    async fn select(&mut self, db: i64) -> StoreResult<()>;

    /// Read one hash field. `None` when the key or field is absent.
    async fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Write one hash field, creating the key if needed.
    async fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<()>;
}

/// Creates connections for the pool.
///
/// Connections returned by `connect` must already have selected the
/// target database; the pool never re-selects on borrow.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>>;
}

/// Where and how to connect. Immutable once the factory is built.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreTarget {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

impl From<&RedisSection> for StoreTarget {
    fn from(section: &RedisSection) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
            password: section.password.clone(),
            db: section.db,
        }
    }
}

impl std::fmt::Debug for StoreTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &if self.password.is_empty() { "" } else { "<redacted>" })
            .field("db", &self.db)
            .finish()
    }
}
