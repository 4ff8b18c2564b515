//! Stream configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

/// Consumer group used when none is configured
pub const UNSET_GROUP_ID: &str = "unset-group-id";

/// Session timeout applied to both consumers and producers, in milliseconds
pub const SESSION_TIMEOUT_MS: u64 = 6000;

/// Broker backend type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamBackend {
    /// Kafka via librdkafka
    #[default]
    Kafka,
    /// In-process broker, for local runs and tests
    Memory,
}

/// Where a new consumer group starts reading
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OffsetPolicy {
    Earliest,
    #[default]
    Latest,
}

/// Kafka-related configuration shared by the consumption driver and the
/// health reporter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Broker backend
    #[serde(default)]
    pub backend: StreamBackend,

    /// Comma separated bootstrap brokers
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Topic prefix, joined to topics with a `.`
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Topic, without prefix
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Starting offset policy for new consumer groups
    #[serde(default)]
    pub offset: OffsetPolicy,

    /// Consumer group id
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Subscribe to every topic starting with the full topic name
    #[serde(default)]
    pub glob: bool,

    /// Request per-message delivery reports from the producer
    #[serde(default)]
    pub delivery_reports: bool,

    /// Producer compression codec
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Timeout tick period in milliseconds; 0 disables timeout ticks
    #[serde(default)]
    pub timeout_ms: u64,

    /// Interval tick period in milliseconds; 0 disables interval ticks
    #[serde(default)]
    pub interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: StreamBackend::default(),
            brokers: default_brokers(),
            prefix: default_prefix(),
            topic: default_topic(),
            offset: OffsetPolicy::default(),
            group_id: default_group_id(),
            glob: false,
            delivery_reports: false,
            codec: default_codec(),
            timeout_ms: 0,
            interval_ms: 0,
        }
    }
}

impl StreamConfig {
    /// Get full topic name with prefix. An empty `topic` means the
    /// configured topic.
    pub fn full_topic(&self, topic: &str) -> String {
        let topic = if topic.is_empty() { &self.topic } else { topic };
        format!("{}.{}", self.prefix, topic)
    }

    /// Subscription expression handed to the broker: the literal full topic,
    /// or an anchored prefix pattern when `glob` is enabled.
    pub fn subscription(&self) -> String {
        let full = self.full_topic("");
        if self.glob {
            format!("^{}.*", regex::escape(&full))
        } else {
            full
        }
    }

    /// Timeout tick period, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Interval tick period, `None` when disabled
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }

    /// Codec to hand to the producer, never empty
    pub fn compression_codec(&self) -> &str {
        if self.codec.is_empty() {
            "none"
        } else {
            &self.codec
        }
    }
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_prefix() -> String {
    "svc".to_string()
}

fn default_topic() -> String {
    "unset".to_string()
}

fn default_group_id() -> String {
    UNSET_GROUP_ID.to_string()
}

fn default_codec() -> String {
    "none".to_string()
}
