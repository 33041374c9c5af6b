//! In-process key-value store.
//!
//! Implements the same `SELECT`/`HGET`/`HSET` surface as Redis so the pool,
//! the counter and the interceptor can run without a server. Used by the
//! test suites and by `dlcountd serve --memory`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::connection::{ConnectionFactory, StoreConnection};
use crate::error::{StoreError, StoreResult};

type Hash = HashMap<String, String>;

#[derive(Debug, Default)]
struct Shared {
    /// db index → key → hash.
    databases: Mutex<HashMap<i64, HashMap<String, Hash>>>,
    fail_connect: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    /// Milliseconds every `HGET` sleeps before answering.
    read_delay_ms: AtomicU64,
    connects: AtomicU64,
    selects: AtomicU64,
}

/// Shared handle to an in-memory store. Cloning shares the data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose connections select `db`.
    pub fn factory(&self, db: i64) -> MemoryConnectionFactory {
        MemoryConnectionFactory {
            store: self.clone(),
            db,
        }
    }

    /// Read a hash field directly, bypassing connections.
    pub async fn hget(&self, db: i64, key: &str, field: &str) -> Option<String> {
        let databases = self.shared.databases.lock().await;
        databases.get(&db)?.get(key)?.get(field).cloned()
    }

    /// Write a hash field directly, bypassing connections.
    pub async fn hset(&self, db: i64, key: &str, field: &str, value: &str) {
        let mut databases = self.shared.databases.lock().await;
        databases
            .entry(db)
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    /// Keys present in database `db`, sorted.
    pub async fn keys(&self, db: i64) -> Vec<String> {
        let databases = self.shared.databases.lock().await;
        let mut keys: Vec<String> = databases
            .get(&db)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.shared.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Make every connection's `HGET` wait `delay` before answering.
    pub fn set_read_delay(&self, delay: Duration) {
        self.shared
            .read_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Connections opened so far.
    pub fn connects(&self) -> u64 {
        self.shared.connects.load(Ordering::Relaxed)
    }

    /// `SELECT` commands issued so far.
    pub fn selects(&self) -> u64 {
        self.shared.selects.load(Ordering::Relaxed)
    }
}

/// Connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    db: i64,
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn select(&mut self, db: i64) -> StoreResult<()> {
        self.store.shared.selects.fetch_add(1, Ordering::Relaxed);
        self.db = db;
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let delay = self.store.shared.read_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.store.shared.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Command("HGET rejected".to_string()));
        }
        Ok(self.store.hget(self.db, key, field).await)
    }

    async fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        if self.store.shared.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Command("HSET rejected".to_string()));
        }
        self.store.hset(self.db, key, field, value).await;
        Ok(())
    }
}

/// Factory opening [`MemoryConnection`]s that have selected a fixed db.
#[derive(Debug, Clone)]
pub struct MemoryConnectionFactory {
    store: MemoryStore,
    db: i64,
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        if self.store.shared.fail_connect.load(Ordering::Relaxed) {
            return Err(StoreError::Connect("connection refused".to_string()));
        }
        self.store.shared.connects.fetch_add(1, Ordering::Relaxed);
        let mut conn = MemoryConnection {
            store: self.store.clone(),
            db: 0,
        };
        conn.select(self.db).await?;
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn factory_connections_select_configured_db() {
        let store = MemoryStore::new();
        let factory = store.factory(3);

        let mut conn = factory.connect().await.unwrap();
        conn.hset("download-2024-01-01", "pkg", "{}").await.unwrap();

        assert_eq!(store.selects(), 1);
        assert_eq!(
            store.hget(3, "download-2024-01-01", "pkg").await.as_deref(),
            Some("{}")
        );
        assert_eq!(store.hget(0, "download-2024-01-01", "pkg").await, None);
    }

    #[tokio::test]
    async fn hget_missing_returns_none() {
        let store = MemoryStore::new();
        let mut conn = store.factory(0).connect().await.unwrap();
        assert_eq!(conn.hget("nope", "nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.hset(0, "k", "f", "v").await;
        assert_eq!(store.hget(0, "k", "f").await.as_deref(), Some("v"));
        assert_eq!(store.keys(0).await, vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn failure_injection() {
        let store = MemoryStore::new();
        let factory = store.factory(0);

        store.set_fail_connect(true);
        assert!(matches!(factory.connect().await, Err(StoreError::Connect(_))));
        store.set_fail_connect(false);

        let mut conn = factory.connect().await.unwrap();
        store.set_fail_writes(true);
        assert!(conn.hset("k", "f", "v").await.is_err());
        store.set_fail_reads(true);
        assert!(conn.hget("k", "f").await.is_err());
        assert_eq!(store.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_delay_holds_hget() {
        let store = MemoryStore::new();
        let mut conn = store.factory(0).connect().await.unwrap();
        store.set_read_delay(Duration::from_secs(1));

        let slow = tokio::time::timeout(Duration::from_millis(500), conn.hget("k", "f")).await;
        assert!(slow.is_err());

        store.set_read_delay(Duration::ZERO);
        assert_eq!(conn.hget("k", "f").await.unwrap(), None);
    }
}
