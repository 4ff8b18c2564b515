//! Error types for broker and stream operations

use crate::stream::message::BrokerError;

/// Result type for stream operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while talking to the broker
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection or client creation failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Metadata probe failed
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    /// Publish failed
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Subscribe failed
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Flush did not complete in time
    #[error("Flush failed: {0}")]
    FlushFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Background client task failed to complete
    #[error("Client task failed: {0}")]
    Task(String),

    /// Error raised by the broker itself
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl From<rdkafka::error::KafkaError> for StreamError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        StreamError::ConnectionFailed(err.to_string())
    }
}

impl From<regex::Error> for StreamError {
    fn from(err: regex::Error) -> Self {
        StreamError::Configuration(format!("invalid subscription pattern: {}", err))
    }
}
