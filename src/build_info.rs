//! Build metadata for a component
//!
//! Values come from the compile environment (`STREAMKIT_COMMIT`,
//! `STREAMKIT_BUILD_DATE` as unix seconds, `STREAMKIT_BUILD_AGENT`) and
//! fall back to `"unknown"`. A `BuildInfo` is constructed explicitly and passed
//! to whatever needs it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub component: String,
    pub version: String,
    #[serde(rename = "commit")]
    pub commit_hash: String,
    #[serde(rename = "builddate")]
    pub date: String,
    pub agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub semver: String,
}

impl BuildInfo {
    /// Build info for `component` from the compile environment
    pub fn new(component: impl Into<String>) -> Self {
        Self::from_parts(
            component,
            env!("CARGO_PKG_VERSION"),
            option_env!("STREAMKIT_COMMIT").unwrap_or(UNKNOWN),
            option_env!("STREAMKIT_BUILD_DATE").unwrap_or(UNKNOWN),
            option_env!("STREAMKIT_BUILD_AGENT").unwrap_or(UNKNOWN),
        )
    }

    pub fn from_parts(
        component: impl Into<String>,
        version: impl Into<String>,
        commit_hash: impl Into<String>,
        date: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        let version = version.into();
        Self {
            component: component.into(),
            semver: semver_of(&version),
            version,
            commit_hash: commit_hash.into(),
            date: date.into(),
            agent: agent.into(),
        }
    }

    /// Build date parsed from unix seconds, when it is one
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.date.parse().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }

    /// Multi-line startup banner
    pub fn banner(&self) -> String {
        let date = match self.parsed_date() {
            Some(parsed) => format!("{} ({})", self.date, parsed.format("%b %d %Y %H:%M:%S UTC")),
            None => self.date.clone(),
        };
        let version = if self.version == self.semver {
            self.version.clone()
        } else {
            format!("{} ({})", self.version, self.semver)
        };

        format!(
            "component: {}\n  version: {}\n    build: {}\n     date: {}\n    agent: {}",
            self.component, version, self.commit_hash, date, self.agent
        )
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{} {} {}",
            self.component, self.version, self.commit_hash, self.date, self.agent
        )
    }
}

/// `vX.Y.Z` versions are kept, anything else becomes `v0.0.0-<version>`
fn semver_of(version: &str) -> String {
    if version.starts_with('v') && version.matches('.').count() == 2 {
        version.to_string()
    } else {
        format!("v0.0.0-{}", version)
    }
}
