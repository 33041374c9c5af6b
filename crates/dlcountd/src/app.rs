//! Daemon wiring: config → connection factory → pool → counter.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dlcount_core::DlcountConfig;
use dlcount_counter::DownloadCounter;
use dlcount_pool::memory::MemoryStore;
use dlcount_pool::{ConnectionFactory, ConnectionPool, PoolConfig, RedisConnectionFactory, StoreTarget};

/// Where counts are stored.
#[derive(Debug, Clone)]
pub enum Backend {
    Redis,
    Memory(MemoryStore),
}

impl Backend {
    pub fn memory() -> Self {
        Backend::Memory(MemoryStore::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Redis => "redis",
            Backend::Memory(_) => "memory",
        }
    }
}

/// Read `path`, or fall back to defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<DlcountConfig> {
    match path {
        Some(path) => DlcountConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(DlcountConfig::default()),
    }
}

/// Open the pool and build the counter it feeds.
pub async fn build_counter(
    config: &DlcountConfig,
    backend: Backend,
) -> anyhow::Result<Arc<DownloadCounter>> {
    let factory: Arc<dyn ConnectionFactory> = match backend {
        Backend::Redis => Arc::new(RedisConnectionFactory::from_config(
            StoreTarget::from(&config.redis),
            &config.pool,
        )),
        Backend::Memory(store) => Arc::new(store.factory(config.redis.db)),
    };

    let pool = ConnectionPool::open(PoolConfig::from(&config.pool), factory).await;
    let counter = DownloadCounter::from_config(Arc::new(pool), &config.counter)
        .context("invalid [counter] section")?;
    Ok(Arc::new(counter))
}
