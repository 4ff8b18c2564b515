//! Topic monitor
//!
//! A [`StreamConsumer`] that watches a subscription and mirrors what it sees
//! into a health [`Reporter`]: message and byte counts as stats, stalls and
//! broker errors as degraded health.

use crate::health::{HealthError, HealthState, Reporter};
use crate::stream::{BrokerError, BrokerMessage, Session, StreamConsumer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Totals of one monitoring run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSummary {
    pub messages: u64,
    pub bytes: u64,
    pub errors: u64,
    pub stalls: u64,
}

pub struct TopicMonitor {
    reporter: Reporter,
    token: CancellationToken,
    subscription: String,
    summary: MonitorSummary,
    stalled: bool,
    last_message_at: Option<DateTime<Utc>>,
}

impl TopicMonitor {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            token: CancellationToken::new(),
            subscription: String::new(),
            summary: MonitorSummary::default(),
            stalled: false,
            last_message_at: None,
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn summary(&self) -> &MonitorSummary {
        &self.summary
    }

    fn publish_counters(&self) {
        self.reporter.add_stat("messages", self.summary.messages);
        self.reporter.add_stat("bytes", self.summary.bytes);
        self.reporter.add_stat("errors", self.summary.errors);
        self.reporter.add_stat("stalled", self.stalled);
        if let Some(at) = self.last_message_at {
            self.reporter.add_stat("last_message", at.to_rfc3339());
        }
    }
}

#[async_trait]
impl StreamConsumer for TopicMonitor {
    type Config = ();
    type Output = MonitorSummary;
    type Error = HealthError;

    async fn start(&mut self, session: &Session, _config: ()) -> Result<(), HealthError> {
        self.subscription = session.subscription();
        self.reporter.persist_stat("subscription", self.subscription.clone());
        self.reporter.persist_stat("started", session.started_at().to_rfc3339());
        self.reporter
            .set_health(HealthState::Healthy, format!("monitoring {}", self.subscription));
        self.publish_counters();
        Ok(())
    }

    async fn message(&mut self, msg: BrokerMessage) -> Result<(), HealthError> {
        self.summary.messages += 1;
        self.summary.bytes += msg.len() as u64;
        self.last_message_at = Some(Utc::now());

        if self.stalled {
            self.stalled = false;
            info!(subscription = %self.subscription, "Messages flowing again");
            self.reporter
                .set_health(HealthState::Healthy, format!("monitoring {}", self.subscription));
        }
        Ok(())
    }

    async fn interval(&mut self, _now: DateTime<Utc>) -> Result<(), HealthError> {
        self.publish_counters();
        Ok(())
    }

    async fn timeout(&mut self, _now: DateTime<Utc>, stalled: bool) -> bool {
        if stalled && !self.stalled {
            self.summary.stalls += 1;
            warn!(subscription = %self.subscription, "No messages since the last timeout");
            self.reporter
                .set_health(HealthState::Degraded, format!("{} stalled", self.subscription));
        }
        self.stalled = stalled;
        self.publish_counters();
        false
    }

    async fn error(&mut self, err: BrokerError) -> bool {
        if let BrokerError::PartitionEof { .. } = err {
            debug!(subscription = %self.subscription, error = %err, "Reached end of partition");
            return false;
        }

        self.summary.errors += 1;
        match err {
            BrokerError::Closed => {
                warn!(subscription = %self.subscription, "Subscription closed");
                true
            }
            BrokerError::AllBrokersDown(reason) => {
                self.reporter
                    .set_health(HealthState::Critical, format!("all brokers down: {}", reason));
                false
            }
            other => {
                self.reporter.set_health(HealthState::Degraded, other.to_string());
                false
            }
        }
    }

    async fn finish(&mut self) -> Result<MonitorSummary, HealthError> {
        self.publish_counters();
        Ok(self.summary.clone())
    }

    fn done(&self) -> CancellationToken {
        self.token.clone()
    }
}
