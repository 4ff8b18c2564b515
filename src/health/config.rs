//! Health reporter configuration

use crate::health::backoff::{DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_CHECK_INTERVAL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flush timeout applied when the reporter stops, in milliseconds
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    /// Reporting service name
    #[serde(default = "default_service")]
    pub service: String,

    /// Topic prefix, joined to the topic with a `.`
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Health topic without prefix; defaults to `health.<service>`
    #[serde(default)]
    pub topic: Option<String>,

    /// Appended to the hostname as `<hostname>-<suffix>`
    #[serde(default)]
    pub hostname_suffix: Option<String>,

    /// Mirror payloads to stdout when the broker is unavailable
    #[serde(default)]
    pub stdout_fallback: bool,

    /// Base connectivity probe cadence (seconds)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Cap on the wait between failing probes (seconds)
    #[serde(default = "default_max_check_interval")]
    pub max_check_interval_secs: u64,

    /// Periodic report cadence (seconds); 0 leaves periodic reporting off
    #[serde(default)]
    pub report_interval_secs: u64,

    /// Flush timeout on stop (milliseconds)
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_ms: u64,

    /// HTTP endpoint that also receives the final state on stop
    #[serde(default)]
    pub signal_url: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            prefix: default_prefix(),
            topic: None,
            hostname_suffix: None,
            stdout_fallback: false,
            check_interval_secs: default_check_interval(),
            max_check_interval_secs: default_max_check_interval(),
            report_interval_secs: 0,
            flush_timeout_ms: default_flush_timeout(),
            signal_url: None,
        }
    }
}

impl HealthConfig {
    /// Config for a named service with defaults elsewhere
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    /// Fully qualified health topic
    pub fn full_topic(&self) -> String {
        let topic = self
            .topic
            .clone()
            .unwrap_or_else(|| format!("health.{}", self.service));
        format!("{}.{}", self.prefix, topic)
    }

    /// Fully qualified service log topic
    pub fn log_topic(&self) -> String {
        format!("{}.{}.log", self.prefix, self.service)
    }

    pub fn check_interval(&self) -> Duration {
        if self.check_interval_secs == 0 {
            DEFAULT_CHECK_INTERVAL
        } else {
            Duration::from_secs(self.check_interval_secs)
        }
    }

    pub fn max_check_interval(&self) -> Duration {
        if self.max_check_interval_secs == 0 {
            DEFAULT_MAX_CHECK_INTERVAL
        } else {
            Duration::from_secs(self.max_check_interval_secs)
        }
    }

    /// `None` when periodic reporting is off
    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval_secs > 0).then(|| Duration::from_secs(self.report_interval_secs))
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

fn default_service() -> String {
    "unset".to_string()
}

fn default_prefix() -> String {
    "svc".to_string()
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL.as_secs()
}

fn default_max_check_interval() -> u64 {
    DEFAULT_MAX_CHECK_INTERVAL.as_secs()
}

fn default_flush_timeout() -> u64 {
    DEFAULT_FLUSH_TIMEOUT_MS
}
