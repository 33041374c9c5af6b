//! The connection pool.
//!
//! A semaphore sized `max_size` bounds concurrent borrowers; each
//! [`PooledConnection`] carries its permit. Idle connections sit on a LIFO
//! stack behind an async mutex, and refills run while holding that mutex,
//! so at most one batch is in flight and `live` never passes `max_size`.
//! Every open connection decrements `live` when it is dropped, whether it
//! was idle, borrowed, or still part of an unfinished batch.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dlcount_core::config::PoolSection;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::connection::{ConnectionFactory, StoreConnection};
use crate::error::{PoolError, PoolResult, StoreError};

/// Pool sizing and wait limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections created by [`ConnectionPool::open`] (default: 10).
    pub initial_size: usize,
    /// Connections created when `acquire` finds no idle one (default: 5).
    pub refill_size: usize,
    /// Hard bound on open connections and on borrowers (default: 64).
    pub max_size: usize,
    /// How long `acquire` waits for a free slot (default: 5s).
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&PoolSection::default())
    }
}

impl From<&PoolSection> for PoolConfig {
    fn from(section: &PoolSection) -> Self {
        let max_size = section.max_size.max(1);
        Self {
            initial_size: section.initial_size.min(max_size),
            refill_size: section.refill_size.clamp(1, max_size),
            max_size,
            acquire_timeout: Duration::from_millis(section.acquire_timeout_ms),
        }
    }
}

/// An open connection owned by the pool, idle or borrowed.
#[derive(Debug)]
struct Entry {
    id: u64,
    created_at: Instant,
    conn: Box<dyn StoreConnection>,
    live: Arc<AtomicUsize>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A connection borrowed from the pool.
///
/// Dereferences to the underlying [`StoreConnection`]. Give it back with
/// [`ConnectionPool::release`] to keep it open for reuse. Dropping it
/// closes the connection and frees its slot, so a cancelled borrower never
/// shrinks the pool's capacity.
#[derive(Debug)]
pub struct PooledConnection {
    entry: Entry,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Pool-unique identifier, stable across borrows.
    pub fn id(&self) -> u64 {
        self.entry.id
    }

    pub fn created_at(&self) -> Instant {
        self.entry.created_at
    }
}

impl Deref for PooledConnection {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        self.entry.conn.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.entry.conn.as_mut()
    }
}

/// Point-in-time pool statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections waiting on the idle stack.
    pub idle: usize,
    /// Connections currently borrowed.
    pub in_use: usize,
    /// Connections currently open.
    pub live: usize,
    /// Connections ever established. Never decreases.
    pub total: usize,
    /// Successful `acquire` calls.
    pub acquired: u64,
    /// Batches created after the initial one.
    pub refills: u64,
}

/// Growable, bounded pool of store connections.
pub struct ConnectionPool {
    idle: Mutex<Vec<Entry>>,
    /// Bounds concurrent borrowers to `max_size`.
    borrowers: Arc<Semaphore>,
    /// Open connections, shared with every [`Entry`].
    live: Arc<AtomicUsize>,
    created: AtomicUsize,
    next_id: AtomicU64,
    acquired: AtomicU64,
    refills: AtomicU64,
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
}

impl ConnectionPool {
    /// Create an empty pool. The first `acquire` triggers a refill batch.
    pub fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            borrowers: Arc::new(Semaphore::new(config.max_size)),
            live: Arc::new(AtomicUsize::new(0)),
            created: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            acquired: AtomicU64::new(0),
            refills: AtomicU64::new(0),
            config,
            factory,
        }
    }

    /// Create a pool and eagerly open the initial batch.
    ///
    /// A failing store does not fail construction: the error is logged and
    /// the next `acquire` retries through a refill.
    pub async fn open(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let pool = Self::new(config, factory);
        {
            let mut idle = pool.idle.lock().await;
            match pool.open_batch(pool.config.initial_size).await {
                Ok(batch) => {
                    tracing::info!(
                        created = batch.len(),
                        max_size = pool.config.max_size,
                        "connection pool opened"
                    );
                    idle.extend(batch);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "initial connection batch failed, deferring to acquire");
                }
            }
        }
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Borrow a connection.
    ///
    /// Waits up to `acquire_timeout` for a borrower slot. Then pops an idle
    /// connection when one exists, or opens a refill batch, keeps all but
    /// one idle, and returns the last.
    pub async fn acquire(&self) -> PoolResult<PooledConnection> {
        let started = tokio::time::Instant::now();
        let deadline = started + self.config.acquire_timeout;

        // The semaphore is never closed.
        let waiting = self.borrowers.clone().acquire_owned();
        let permit = match tokio::time::timeout_at(deadline, waiting).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => return Err(self.exhausted(started)),
        };

        // A refill in progress holds this lock.
        let Ok(mut idle) = tokio::time::timeout_at(deadline, self.idle.lock()).await else {
            return Err(self.exhausted(started));
        };

        if let Some(entry) = idle.pop() {
            return Ok(self.hand_out(entry, permit, "reused idle connection"));
        }

        // Idle is empty and this borrower holds no connection, so
        // `live < max_size` and the batch has room for at least one.
        let room = self
            .config
            .max_size
            .saturating_sub(self.live.load(Ordering::Acquire));
        let mut batch = self.open_batch(self.config.refill_size.min(room)).await?;
        let Some(entry) = batch.pop() else {
            return Err(self.exhausted(started));
        };
        self.refills.fetch_add(1, Ordering::Relaxed);
        idle.extend(batch);
        Ok(self.hand_out(entry, permit, "created connection in refill batch"))
    }

    /// Return a borrowed connection. No health check is performed.
    pub async fn release(&self, conn: PooledConnection) {
        let PooledConnection {
            entry,
            _permit: permit,
        } = conn;
        let id = entry.id;
        let idle = {
            let mut idle = self.idle.lock().await;
            idle.push(entry);
            idle.len()
        };
        // The permit drops after the connection is back on the stack.
        drop(permit);
        tracing::trace!(connection = id, idle, "returned connection to pool");
    }

    pub async fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().await.len();
        let live = self.live.load(Ordering::Acquire);
        PoolStats {
            idle,
            in_use: live.saturating_sub(idle),
            live,
            total: self.created.load(Ordering::Acquire),
            acquired: self.acquired.load(Ordering::Relaxed),
            refills: self.refills.load(Ordering::Relaxed),
        }
    }

    fn hand_out(
        &self,
        entry: Entry,
        permit: OwnedSemaphorePermit,
        reason: &'static str,
    ) -> PooledConnection {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(connection = entry.id, reason);
        PooledConnection {
            entry,
            _permit: permit,
        }
    }

    fn exhausted(&self, started: tokio::time::Instant) -> PoolError {
        tracing::warn!(
            max_size = self.config.max_size,
            waited_ms = started.elapsed().as_millis() as u64,
            "connection pool exhausted"
        );
        PoolError::Exhausted {
            max_size: self.config.max_size,
            waited: started.elapsed(),
        }
    }

    /// Open up to `wanted` connections. Callers hold the idle lock.
    ///
    /// Stops at the first failure. Errors only when not a single connection
    /// could be opened.
    async fn open_batch(&self, wanted: usize) -> PoolResult<Vec<Entry>> {
        let mut batch = Vec::with_capacity(wanted);
        let mut failure: Option<StoreError> = None;
        for _ in 0..wanted {
            match self.factory.connect().await {
                Ok(conn) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    self.live.fetch_add(1, Ordering::AcqRel);
                    self.created.fetch_add(1, Ordering::AcqRel);
                    tracing::debug!(connection = id, "created store connection");
                    batch.push(Entry {
                        id,
                        created_at: Instant::now(),
                        conn,
                        live: self.live.clone(),
                    });
                }
                Err(e) => {
                    // The factory already exhausted its retries.
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            Some(e) if batch.is_empty() => Err(PoolError::Store(e)),
            Some(e) => {
                tracing::warn!(
                    created = batch.len(),
                    requested = wanted,
                    error = %e,
                    "connection batch partially created"
                );
                Ok(batch)
            }
            None => {
                if !batch.is_empty() {
                    tracing::info!(
                        created = batch.len(),
                        total = self.created.load(Ordering::Relaxed),
                        "grew connection pool"
                    );
                }
                Ok(batch)
            }
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("live", &self.live.load(Ordering::Relaxed))
            .field("total", &self.created.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
