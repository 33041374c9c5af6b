//! The counting boundary.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use dlcount_core::config::CounterSection;
use dlcount_core::{ConfigResult, DayKey, VersionParser};
use dlcount_pool::ConnectionPool;

use crate::error::CountResult;
use crate::record::increment;

/// Outcome of one counted download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counted {
    pub day: DayKey,
    pub version: String,
    /// Count for `(day, package, version)` after this download.
    pub count: u64,
}

/// Parses download requests and bumps the daily counters.
pub struct DownloadCounter {
    pool: Arc<ConnectionPool>,
    parser: Arc<dyn VersionParser>,
    offset: FixedOffset,
}

impl DownloadCounter {
    pub fn new(pool: Arc<ConnectionPool>, parser: Arc<dyn VersionParser>, offset: FixedOffset) -> Self {
        Self {
            pool,
            parser,
            offset,
        }
    }

    /// Build with the parser and day offset from `[counter]`.
    pub fn from_config(pool: Arc<ConnectionPool>, section: &CounterSection) -> ConfigResult<Self> {
        Ok(Self::new(pool, section.parser.build(), section.offset()?))
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Count one download of `filename` for `package`, now.
    pub async fn count(&self, package: &str, filename: &str) -> CountResult<Counted> {
        self.count_at(package, filename, Utc::now()).await
    }

    /// Count one download as if it happened at `now`.
    ///
    /// The borrowed connection goes back to the pool whether or not the
    /// store commands succeed. Dropping the future mid-command closes the
    /// connection instead; its slot is freed either way.
    pub async fn count_at(
        &self,
        package: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) -> CountResult<Counted> {
        let version = self.parser.parse_version(filename, package);
        let day = DayKey::at(now, self.offset);

        let mut conn = self.pool.acquire().await?;
        let result = increment(&mut *conn, package, &version, &day).await;
        self.pool.release(conn).await;
        let count = result?;

        tracing::debug!(
            package,
            version = %version,
            day = %day,
            count,
            "counted download"
        );
        Ok(Counted {
            day,
            version,
            count,
        })
    }

    /// Count a download, logging and discarding any failure.
    ///
    /// This is the only place counting errors stop. Callers never see them.
    pub async fn record(&self, package: &str, filename: &str) {
        if let Err(e) = self.count(package, filename).await {
            tracing::warn!(package, filename, error = %e, "failed to count download");
        }
    }
}

impl std::fmt::Debug for DownloadCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCounter")
            .field("parser", &self.parser)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
