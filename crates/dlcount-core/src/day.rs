//! Daily record keys.
//!
//! Downloads are bucketed per calendar day in a fixed UTC offset (default
//! `+08:00`). The bucket key is `download-YYYY-MM-DD`; it is never deleted
//! here, retention is left to the store.

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{ConfigError, ConfigResult};

/// Offset used when none is configured.
pub const DEFAULT_UTC_OFFSET: &str = "+08:00";

const KEY_PREFIX: &str = "download-";

/// Key of the per-day hash record holding every package's counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayKey(String);

impl DayKey {
    /// Key for the day containing `instant`, as seen from `offset`.
    pub fn at(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        let date = instant.with_timezone(&offset).date_naive();
        Self(format!("{KEY_PREFIX}{}", date.format("%Y-%m-%d")))
    }

    /// Key for the current day.
    pub fn today(offset: FixedOffset) -> Self {
        Self::at(Utc::now(), offset)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DayKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parse `"+HH:MM"` / `"-HH:MM"` into a fixed offset.
pub fn parse_utc_offset(offset: &str) -> ConfigResult<FixedOffset> {
    let invalid = || ConfigError::InvalidOffset(offset.to_string());

    let bytes = offset.as_bytes();
    if bytes.len() != 6
        || bytes[3] != b':'
        || ![1, 2, 4, 5].iter().all(|&i| bytes[i].is_ascii_digit())
    {
        return Err(invalid());
    }
    let sign = match bytes[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(invalid()),
    };
    let hours: i32 = offset[1..3].parse().map_err(|_| invalid())?;
    let minutes: i32 = offset[4..6].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}
