//! Broker trait abstractions

use crate::stream::config::StreamConfig;
use crate::stream::error::StreamResult;
use crate::stream::message::{BrokerError, BrokerEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked from the publisher's delivery path for broker-level
/// failures. It runs on a client thread and must not block.
pub type ErrorHook = Arc<dyn Fn(BrokerError) + Send + Sync>;

/// Source of subscription events
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message or error.
    ///
    /// Must be cancel safe: the consumption driver races this future against
    /// tickers and drops it when another branch wins, and no event may be
    /// lost when that happens.
    async fn next_event(&mut self) -> BrokerEvent;
}

/// Creates subscriptions for the consumption driver
#[async_trait]
pub trait Broker: Send + Sync {
    type Subscription: Subscription;

    /// Connect, check that the broker answers, and subscribe to
    /// [`StreamConfig::subscription`].
    ///
    /// Implementations whose client calls block must run them off the async
    /// executor.
    async fn subscribe(&self, config: &StreamConfig) -> StreamResult<Self::Subscription>;
}

/// Publishing half of a broker session
///
/// All methods are synchronous. `produce` only enqueues; delivery failures
/// are reported later through the hook installed with [`Publisher::on_error`].
/// `probe` and `flush` may block up to their timeout.
pub trait Publisher: Send + Sync {
    /// Enqueue a payload for a fully qualified topic
    fn produce(&self, topic: &str, payload: &[u8]) -> StreamResult<()>;

    /// Lightweight metadata round trip to the broker
    fn probe(&self, timeout: Duration) -> StreamResult<()>;

    /// Wait for outstanding messages to be delivered
    fn flush(&self, timeout: Duration) -> StreamResult<()>;

    /// Release the session
    fn close(&self) -> StreamResult<()>;

    /// Install the broker error hook, replacing any previous one
    fn on_error(&self, hook: ErrorHook);
}
