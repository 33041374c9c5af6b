//! Package identifier parsing.
//!
//! A download request carries the full package name and the archive
//! filename (`@scope/pkg-1.2.3.tgz`, `name-1.0.0-beta-1.tgz`). Parsers derive
//! the version from the filename; the name always comes from the request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Strategy deriving `packageVersion` from an archive filename.
pub trait VersionParser: Send + Sync + std::fmt::Debug {
    /// Never fails: unparseable input still yields a (possibly odd) version
    /// string so that the download is counted somewhere.
    fn parse_version(&self, filename: &str, package_name: &str) -> String;
}

/// Parser selection in `[counter].parser`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    #[default]
    Heuristic,
    Semver,
}

impl ParserKind {
    pub fn build(self) -> Arc<dyn VersionParser> {
        match self {
            ParserKind::Heuristic => Arc::new(HeuristicParser),
            ParserKind::Semver => Arc::new(SemverParser),
        }
    }
}

/// First-letterless-token heuristic.
///
/// 1. Drop the extension (the last `.` segment).
/// 2. Split the stem on `-`.
/// 3. The version starts at the first token containing no ASCII letter;
///    index 0 when there is none.
/// 4. Re-join from there with `-`, restoring pre-release hyphens.
///
/// Package names with a letterless token (`2048-game`) are misparsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicParser;

impl VersionParser for HeuristicParser {
    fn parse_version(&self, filename: &str, package_name: &str) -> String {
        let stem = filename.rsplit_once('.').map_or("", |(stem, _ext)| stem);
        let tokens: Vec<&str> = stem.split('-').collect();

        let start = tokens
            .iter()
            .position(|token| !token.chars().any(|c| c.is_ascii_alphabetic()))
            .unwrap_or_else(|| {
                tracing::debug!(
                    package = package_name,
                    filename,
                    "no version token found in archive name, using whole stem"
                );
                0
            });

        tokens[start..].join("-")
    }
}

/// Name-aware parser validated with `semver`.
///
/// Strips `<unscoped-name>-` and `.tgz` from the archive basename and keeps
/// the remainder if it is a valid semantic version. Anything else goes
/// through [`HeuristicParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverParser;

impl VersionParser for SemverParser {
    fn parse_version(&self, filename: &str, package_name: &str) -> String {
        let unscoped = package_name.rsplit('/').next().unwrap_or(package_name);
        let basename = filename.rsplit('/').next().unwrap_or(filename);

        let candidate = basename
            .strip_suffix(".tgz")
            .and_then(|rest| rest.strip_prefix(unscoped))
            .and_then(|rest| rest.strip_prefix('-'));

        match candidate {
            Some(version) if semver::Version::parse(version).is_ok() => version.to_string(),
            _ => HeuristicParser.parse_version(filename, package_name),
        }
    }
}
