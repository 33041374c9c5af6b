//! dlcount-core — shared types for the download counter.
//!
//! - [`config`]: the `dlcount.toml` configuration surface.
//! - [`day`]: daily record keys (`download-YYYY-MM-DD`) in a fixed UTC offset.
//! - [`parser`]: strategies deriving a package version from an archive filename.

pub mod config;
pub mod day;
pub mod error;
pub mod parser;

pub use config::DlcountConfig;
pub use day::DayKey;
pub use error::{ConfigError, ConfigResult};
pub use parser::{HeuristicParser, ParserKind, SemverParser, VersionParser};
