//! Read-modify-write of one package field.
//!
//! `increment` is not atomic: two concurrent calls for the same day and
//! package may both read the same blob, and the later write drops the
//! earlier increment. Counts are best-effort under contention.

use dlcount_core::DayKey;
use dlcount_pool::{StoreConnection, StoreResult};
use serde_json::{Map, Value};

/// Add one download of `version` to an existing JSON blob.
///
/// Missing, unparseable and non-object blobs count as `{}`. A version whose
/// stored count is not a non-negative integer restarts at 1. Returns the
/// new blob and the version's new count.
pub fn merge_download(existing: Option<&str>, version: &str) -> (String, u64) {
    let mut counts = match existing.map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(counts))) => counts,
        _ => Map::new(),
    };

    let count = counts
        .get(version)
        .and_then(Value::as_u64)
        .map_or(1, |n| n.saturating_add(1));
    counts.insert(version.to_string(), Value::from(count));

    (Value::Object(counts).to_string(), count)
}

/// Count one download of `package@version` in the `day` record.
pub async fn increment(
    conn: &mut dyn StoreConnection,
    package: &str,
    version: &str,
    day: &DayKey,
) -> StoreResult<u64> {
    let existing = conn.hget(day.as_str(), package).await?;
    let (blob, count) = merge_download(existing.as_deref(), version);
    conn.hset(day.as_str(), package, &blob).await?;
    Ok(count)
}
