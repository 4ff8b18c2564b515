//! Broker sessions and the consumption driver
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │         consume(broker, config, consumer)        │
//! ├─────────────────────────────────────────────────┤
//! │  select! over:                                   │
//! │   - broker events   - interval ticker            │
//! │   - timeout ticker  - cancellation token         │
//! │  then StreamConsumer::process() every iteration  │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │      Broker abstraction                          │
//! ├─────────────────────────────────────────────────┤
//! │  - Broker / Subscription (read side)             │
//! │  - Publisher (write side, used by health)        │
//! └─────────────────────────────────────────────────┘
//!           │                        │
//!           ▼                        ▼
//! ┌──────────────────┐    ┌──────────────────┐
//! │  Kafka Backend   │    │  Memory Backend  │
//! └──────────────────┘    └──────────────────┘
//! ```

mod config;
mod consume;
mod error;
mod kafka;
mod memory;
mod message;
mod session;
mod traits;

pub use config::{OffsetPolicy, StreamBackend, StreamConfig, SESSION_TIMEOUT_MS, UNSET_GROUP_ID};
pub use consume::{consume, ConsumeError, StreamConsumer};
pub use error::{StreamError, StreamResult};
pub use kafka::{consumer_config, producer_config, KafkaBroker, KafkaPublisher, KafkaSubscription};
pub use memory::{MemoryBroker, MemorySubscription, DEFAULT_HISTORY_LIMIT};
pub use message::{BrokerError, BrokerEvent, BrokerMessage};
pub use session::Session;
pub use traits::{Broker, ErrorHook, Publisher, Subscription};
