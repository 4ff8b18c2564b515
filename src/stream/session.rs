//! Per-invocation state of the consumption driver

use crate::stream::config::StreamConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Configuration and running counters for one driver invocation.
///
/// Counters only ever grow; the session is dropped when the driver returns.
#[derive(Debug, Clone)]
pub struct Session {
    config: StreamConfig,
    messages: u64,
    bytes: u64,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            messages: 0,
            bytes: 0,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Fully qualified topic (or pattern) this session subscribes to
    pub fn subscription(&self) -> String {
        self.config.subscription()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.config.interval()
    }

    /// Messages received so far
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Payload bytes received so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn record_message(&mut self, len: usize) {
        self.messages += 1;
        self.bytes += len as u64;
    }
}
