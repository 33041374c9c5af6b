//! dlcount.toml configuration parser.
//!
//! Every section is optional; a missing section or key falls back to the
//! defaults below. `port` and `db` are coerced from either TOML integers or
//! numeric strings, since hosting registries tend to hand plugin settings
//! through as strings.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::day::{DEFAULT_UTC_OFFSET, parse_utc_offset};
use crate::error::ConfigResult;
use crate::parser::ParserKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DlcountConfig {
    pub redis: RedisSection,
    pub pool: PoolSection,
    pub counter: CounterSection,
}

/// Address and credentials of the key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    pub host: String,
    #[serde(deserialize_with = "coerce::port")]
    pub port: u16,
    pub password: String,
    /// Database index selected once on every new connection.
    #[serde(alias = "index", deserialize_with = "coerce::db")]
    pub db: i64,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Connections created eagerly when the pool opens.
    pub initial_size: usize,
    /// Connections created when `acquire` finds the pool empty.
    pub refill_size: usize,
    /// Upper bound on live connections.
    pub max_size: usize,
    /// How long `acquire` waits for a release once `max_size` is reached.
    pub acquire_timeout_ms: u64,
    /// Timeout for a single connection attempt.
    pub connect_timeout_ms: u64,
    /// Attempts per connection before giving up.
    pub connect_attempts: u32,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            initial_size: 10,
            refill_size: 5,
            max_size: 64,
            acquire_timeout_ms: 5_000,
            connect_timeout_ms: 2_000,
            connect_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterSection {
    /// Offset used to bucket downloads into calendar days.
    pub utc_offset: String,
    pub parser: ParserKind,
}

impl Default for CounterSection {
    fn default() -> Self {
        Self {
            utc_offset: DEFAULT_UTC_OFFSET.to_string(),
            parser: ParserKind::default(),
        }
    }
}

impl CounterSection {
    /// The configured offset as a `chrono` fixed offset.
    pub fn offset(&self) -> ConfigResult<chrono::FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }
}

impl DlcountConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: DlcountConfig = toml::from_str(content)?;
        // Surface a bad offset at load time rather than on the first download.
        config.counter.offset()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

mod coerce {
    use super::*;
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    fn number<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("expected a number, got '{s}'"))),
        }
    }

    pub fn port<'de, D>(deserializer: D) -> Result<u16, D::Error>
    where
        D: Deserializer<'de>,
    {
        let n = number(deserializer)?;
        u16::try_from(n).map_err(|_| D::Error::custom(format!("port out of range: {n}")))
    }

    pub fn db<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        number(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = DlcountConfig::from_toml_str("").unwrap();
        assert_eq!(config, DlcountConfig::default());
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.pool.initial_size, 10);
        assert_eq!(config.pool.refill_size, 5);
        assert_eq!(config.counter.utc_offset, "+08:00");
        assert_eq!(config.counter.parser, ParserKind::Heuristic);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[redis]
host = "cache.internal"
port = 6380
password = "s3cret"
db = 3

[pool]
initial_size = 4
refill_size = 2
max_size = 8

[counter]
utc_offset = "-05:00"
parser = "semver"
"#;
        let config = DlcountConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.redis.host, "cache.internal");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.redis.password, "s3cret");
        assert_eq!(config.redis.db, 3);
        assert_eq!(config.pool.max_size, 8);
        assert_eq!(config.pool.connect_attempts, 10);
        assert_eq!(config.counter.parser, ParserKind::Semver);
    }

    #[test]
    fn port_and_db_accept_numeric_strings() {
        let toml_str = r#"
[redis]
port = "6390"
index = "2"
"#;
        let config = DlcountConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.redis.port, 6390);
        assert_eq!(config.redis.db, 2);
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let toml_str = r#"
[redis]
port = "redis"
"#;
        assert!(DlcountConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn bad_offset_is_rejected_at_load() {
        let toml_str = r#"
[counter]
utc_offset = "8"
"#;
        assert!(DlcountConfig::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn from_file_roundtrips_through_toml() {
        let mut config = DlcountConfig::default();
        config.redis.host = "10.0.0.5".to_string();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes())
            .unwrap();

        let loaded = DlcountConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
