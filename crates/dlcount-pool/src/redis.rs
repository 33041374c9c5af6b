//! Redis-backed connections.
//!
//! Each pooled connection is its own `redis` client connection: the
//! password is sent during the handshake, then `SELECT db` runs once before
//! the connection is handed to the pool.
//!
//! # Retry policy
//!
//! A connection attempt that fails with a transient error (refused, reset,
//! timed out) is retried after `min(attempt × 50ms, 2000ms)`, up to
//! `connect_attempts` attempts. Authentication and `SELECT` failures are
//! returned immediately. Commands on an established connection are never
//! retried here.

use std::time::Duration;

use async_trait::async_trait;
use dlcount_core::config::PoolSection;

use crate::connection::{ConnectionFactory, StoreConnection, StoreTarget};
use crate::error::{StoreError, StoreResult};

const RETRY_STEP: Duration = Duration::from_millis(50);
const RETRY_CAP: Duration = Duration::from_millis(2_000);

/// Delay before retry number `attempt` (1-based).
pub fn retry_delay(attempt: u32) -> Duration {
    RETRY_STEP.saturating_mul(attempt).min(RETRY_CAP)
}

// ── RedisConnection ─────────────────────────────────────────────────

/// A [`StoreConnection`] over a `redis` async connection.
pub struct RedisConnection {
    inner: redis::aio::MultiplexedConnection,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn select(&mut self, db: i64) -> StoreResult<()> {
        let _: () = redis::cmd("SELECT")
            .arg(db)
            .query_async(&mut self.inner)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut self.inner)
            .await
            .map_err(command_error)?;
        Ok(value)
    }

    async fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let _: () = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut self.inner)
            .await
            .map_err(command_error)?;
        Ok(())
    }
}

fn command_error(err: redis::RedisError) -> StoreError {
    StoreError::Command(err.to_string())
}

fn connect_error(err: redis::RedisError) -> StoreError {
    if err.kind() == redis::ErrorKind::AuthenticationFailed {
        StoreError::Auth(err.to_string())
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        StoreError::Connect(err.to_string())
    } else {
        // Handshake replies such as NOAUTH/WRONGPASS arrive as server errors.
        let message = err.to_string();
        if message.contains("NOAUTH") || message.contains("WRONGPASS") {
            StoreError::Auth(message)
        } else {
            StoreError::Connect(message)
        }
    }
}

// ── RedisConnectionFactory ──────────────────────────────────────────

/// Factory opening authenticated Redis connections bound to `target.db`.
#[derive(Debug, Clone)]
pub struct RedisConnectionFactory {
    target: StoreTarget,
    connect_timeout: Duration,
    attempts: u32,
}

impl RedisConnectionFactory {
    pub fn new(target: StoreTarget, connect_timeout: Duration, attempts: u32) -> Self {
        Self {
            target,
            connect_timeout,
            attempts: attempts.max(1),
        }
    }

    /// Build from the `[pool]` section's timeout and attempt settings.
    pub fn from_config(target: StoreTarget, pool: &PoolSection) -> Self {
        Self::new(
            target,
            Duration::from_millis(pool.connect_timeout_ms),
            pool.connect_attempts,
        )
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    fn connection_info(&self) -> redis::ConnectionInfo {
        let password = if self.target.password.is_empty() {
            None
        } else {
            Some(self.target.password.clone())
        };
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.target.host.clone(), self.target.port),
            redis: redis::RedisConnectionInfo {
                password,
                ..Default::default()
            },
        }
    }

    async fn connect_once(&self) -> StoreResult<RedisConnection> {
        let client = redis::Client::open(self.connection_info()).map_err(connect_error)?;
        let inner = tokio::time::timeout(
            self.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            StoreError::Connect(format!(
                "{}:{} did not answer within {:?}",
                self.target.host, self.target.port, self.connect_timeout
            ))
        })?
        .map_err(connect_error)?;

        let mut conn = RedisConnection { inner };
        conn.select(self.target.db).await?;
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnectionFactory {
    async fn connect(&self) -> StoreResult<Box<dyn StoreConnection>> {
        let mut attempt = 1;
        loop {
            match self.connect_once().await {
                Ok(conn) => {
                    tracing::debug!(
                        host = %self.target.host,
                        port = self.target.port,
                        db = self.target.db,
                        attempt,
                        "opened redis connection"
                    );
                    return Ok(Box::new(conn));
                }
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let delay = retry_delay(attempt);
                    tracing::warn!(
                        host = %self.target.host,
                        port = self.target.port,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "redis connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
