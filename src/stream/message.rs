//! Event types yielded by a broker subscription

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use serde::{Deserialize, Serialize};

/// A message received from the broker, detached from the client's buffers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Topic the message was read from
    pub topic: String,

    /// Partition within the topic
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,

    /// Optional message key
    pub key: Option<Vec<u8>>,

    /// Message value; empty when the broker delivered no payload
    pub payload: Vec<u8>,

    /// Broker timestamp in milliseconds since the epoch, when known
    pub timestamp_ms: Option<i64>,
}

impl BrokerMessage {
    /// Build a message for a topic with the given payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key: None,
            payload: payload.into(),
            timestamp_ms: None,
        }
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the message has no payload
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl<'a> From<&BorrowedMessage<'a>> for BrokerMessage {
    fn from(msg: &BorrowedMessage<'a>) -> Self {
        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            timestamp_ms: msg.timestamp().to_millis(),
        }
    }
}

/// Broker-level error events. End-of-partition is reported here too; the
/// consumer decides which of these are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Reached the current end of a partition
    #[error("partition {partition} reached end of stream")]
    PartitionEof { partition: i32 },

    /// No broker in the cluster can be reached
    #[error("all brokers down: {0}")]
    AllBrokersDown(String),

    /// A produced message could not be delivered
    #[error("delivery to {topic} failed: {reason}")]
    Delivery { topic: String, reason: String },

    /// The subscription has been closed and will yield nothing further
    #[error("subscription closed")]
    Closed,

    /// Any other client or protocol error
    #[error("broker error: {0}")]
    Other(String),
}

impl BrokerError {
    /// True for end-of-partition and closed-stream signals
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, BrokerError::PartitionEof { .. } | BrokerError::Closed)
    }
}

impl From<KafkaError> for BrokerError {
    fn from(err: KafkaError) -> Self {
        match err {
            KafkaError::PartitionEOF(partition) => BrokerError::PartitionEof { partition },
            KafkaError::Global(RDKafkaErrorCode::AllBrokersDown) => {
                BrokerError::AllBrokersDown(err.to_string())
            }
            other => BrokerError::Other(other.to_string()),
        }
    }
}

/// One event from a subscription: either a message or an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Message(BrokerMessage),
    Error(BrokerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_error_mapping() {
        let eof: BrokerError = KafkaError::PartitionEOF(3).into();
        assert_eq!(eof, BrokerError::PartitionEof { partition: 3 });
        assert!(eof.is_end_of_stream());

        let down: BrokerError = KafkaError::Global(RDKafkaErrorCode::AllBrokersDown).into();
        assert!(matches!(down, BrokerError::AllBrokersDown(_)));
        assert!(!down.is_end_of_stream());
    }

    #[test]
    fn test_message_len() {
        let msg = BrokerMessage::new("svc.events", b"hello".to_vec());
        assert_eq!(msg.len(), 5);
        assert!(!msg.is_empty());
        assert!(BrokerMessage::new("svc.events", Vec::new()).is_empty());
    }
}
