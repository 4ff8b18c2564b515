//! streamkit
//!
//! Building blocks for services that consume Kafka topics:
//!
//! - [`stream`]: broker sessions and the [`stream::consume`] driver that
//!   multiplexes messages, interval ticks, timeout ticks and cancellation
//!   into a [`stream::StreamConsumer`].
//! - [`health`]: the [`health::Reporter`], which publishes health snapshots
//!   to the broker and monitors broker connectivity.
//! - [`monitor`]: a ready-made consumer that reports a topic's traffic as
//!   service health.

pub mod build_info;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod stream;
pub mod telemetry;

pub use error::{Error, Result};
