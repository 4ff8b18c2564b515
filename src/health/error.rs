//! Error types for health reporting

use crate::stream::{BrokerError, StreamError};

/// Result type for health operations
pub type HealthResult<T> = std::result::Result<T, HealthError>;

/// Errors surfaced by the health reporter, either returned directly or
/// delivered to the error callback
#[derive(Debug, Clone, thiserror::Error)]
pub enum HealthError {
    /// No publisher was configured
    #[error("producer not set: {topic}")]
    ProducerMissing { topic: String },

    /// The publisher rejected the payload
    #[error("could not produce to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// The payload was handed over but the broker is known to be down
    #[error("broker not available: {topic}")]
    BrokerUnavailable { topic: String },

    /// Connectivity probe failed
    #[error("broker unhealthy: {0}")]
    BrokerUnhealthy(String),

    /// Error reported by the publisher's client
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Flush or close failed during shutdown
    #[error("shutdown failed: {0}")]
    Shutdown(String),

    /// The reporter was already stopped
    #[error("reporter already stopped")]
    AlreadyStopped,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Out-of-band signal could not be delivered
    #[error("signal failed: {0}")]
    Signal(String),
}

impl HealthError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            HealthError::ProducerMissing { .. } => "producer_missing",
            HealthError::Publish { .. } => "publish",
            HealthError::BrokerUnavailable { .. } => "broker_unavailable",
            HealthError::BrokerUnhealthy(_) => "broker_unhealthy",
            HealthError::Broker(_) => "broker",
            HealthError::Shutdown(_) => "shutdown",
            HealthError::AlreadyStopped => "already_stopped",
            HealthError::Configuration(_) => "configuration",
            HealthError::Signal(_) => "signal",
        }
    }
}

impl From<StreamError> for HealthError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Broker(e) => HealthError::Broker(e),
            StreamError::Configuration(msg) => HealthError::Configuration(msg),
            StreamError::Unreachable(msg) => HealthError::BrokerUnhealthy(msg),
            other => HealthError::Shutdown(other.to_string()),
        }
    }
}
