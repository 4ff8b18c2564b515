//! In-process broker
//!
//! Implements both [`Broker`] and [`Publisher`] on top of unbounded tokio
//! channels. Produced messages fan out to every subscription whose
//! expression matches the topic. Subscription expressions starting with `^`
//! are treated as regular expressions, everything else as a literal topic,
//! mirroring librdkafka's convention.
//!
//! Produced messages are also kept in a bounded history for inspection,
//! [`DEFAULT_HISTORY_LIMIT`] entries unless set with
//! [`MemoryBroker::with_history_limit`]. The oldest entries are dropped first.

use crate::stream::config::StreamConfig;
use crate::stream::error::{StreamError, StreamResult};
use crate::stream::message::{BrokerError, BrokerEvent, BrokerMessage};
use crate::stream::traits::{Broker, ErrorHook, Publisher, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Produced messages retained by default
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

enum TopicMatcher {
    Literal(String),
    Pattern(Regex),
}

impl TopicMatcher {
    fn parse(expression: &str) -> StreamResult<Self> {
        if expression.starts_with('^') {
            Ok(TopicMatcher::Pattern(Regex::new(expression)?))
        } else {
            Ok(TopicMatcher::Literal(expression.to_string()))
        }
    }

    fn matches(&self, topic: &str) -> bool {
        match self {
            TopicMatcher::Literal(t) => t == topic,
            TopicMatcher::Pattern(re) => re.is_match(topic),
        }
    }
}

struct Subscriber {
    matcher: TopicMatcher,
    tx: mpsc::UnboundedSender<BrokerEvent>,
}

struct Inner {
    subscribers: Vec<Subscriber>,
    published: VecDeque<BrokerMessage>,
    history_limit: usize,
    offsets: HashMap<String, i64>,
    reachable: bool,
    closed: bool,
    hook: Option<ErrorHook>,
}

/// In-memory broker session. Clones share the same state.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Broker keeping at most `limit` produced messages; zero keeps none
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                subscribers: Vec::new(),
                published: VecDeque::new(),
                history_limit: limit,
                offsets: HashMap::new(),
                reachable: true,
                closed: false,
                hook: None,
            })),
        }
    }

    /// Toggle whether probes, subscriptions and produces succeed
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.lock().reachable = reachable;
    }

    /// Deliver an error event to every live subscription
    pub fn inject_error(&self, error: BrokerError) {
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|s| s.tx.send(BrokerEvent::Error(error.clone())).is_ok());
    }

    /// Raise a client-level error through the publisher's error hook
    pub fn raise_client_error(&self, error: BrokerError) {
        let hook = self.inner.lock().hook.clone();
        if let Some(hook) = hook {
            hook(error);
        }
    }

    /// End every subscription; each yields [`BrokerError::Closed`] once
    pub fn close_subscriptions(&self) {
        self.inner.lock().subscribers.clear();
    }

    /// Retained history, oldest first
    pub fn published(&self) -> Vec<BrokerMessage> {
        self.inner.lock().published.iter().cloned().collect()
    }

    /// Retained payloads produced to one topic, oldest first
    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// True once [`Publisher::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Subscription = MemorySubscription;

    async fn subscribe(&self, config: &StreamConfig) -> StreamResult<MemorySubscription> {
        let matcher = TopicMatcher::parse(&config.subscription())?;

        let mut inner = self.inner.lock();
        if !inner.reachable {
            return Err(StreamError::Unreachable("memory broker unreachable".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber { matcher, tx });

        Ok(MemorySubscription { rx, exhausted: false })
    }
}

impl Publisher for MemoryBroker {
    fn produce(&self, topic: &str, payload: &[u8]) -> StreamResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(StreamError::PublishFailed("producer closed".to_string()));
        }
        if !inner.reachable {
            return Err(StreamError::PublishFailed("memory broker unreachable".to_string()));
        }

        let offset = inner.offsets.entry(topic.to_string()).or_insert(0);
        let msg = BrokerMessage {
            offset: *offset,
            timestamp_ms: Some(chrono::Utc::now().timestamp_millis()),
            ..BrokerMessage::new(topic, payload.to_vec())
        };
        *offset += 1;

        inner.subscribers.retain(|s| {
            if s.matcher.matches(topic) {
                s.tx.send(BrokerEvent::Message(msg.clone())).is_ok()
            } else {
                !s.tx.is_closed()
            }
        });
        if inner.history_limit > 0 {
            if inner.published.len() == inner.history_limit {
                inner.published.pop_front();
            }
            inner.published.push_back(msg);
        }

        Ok(())
    }

    fn probe(&self, _timeout: Duration) -> StreamResult<()> {
        if self.inner.lock().reachable {
            Ok(())
        } else {
            Err(StreamError::Unreachable("memory broker unreachable".to_string()))
        }
    }

    fn flush(&self, _timeout: Duration) -> StreamResult<()> {
        Ok(())
    }

    fn close(&self) -> StreamResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }

    fn on_error(&self, hook: ErrorHook) {
        self.inner.lock().hook = Some(hook);
    }
}

/// Subscription on a [`MemoryBroker`]
pub struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<BrokerEvent>,
    exhausted: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_event(&mut self) -> BrokerEvent {
        if self.exhausted {
            return std::future::pending().await;
        }
        match self.rx.recv().await {
            Some(event) => event,
            None => {
                self.exhausted = true;
                BrokerEvent::Error(BrokerError::Closed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(topic: &str, glob: bool) -> StreamConfig {
        StreamConfig {
            prefix: "test".to_string(),
            topic: topic.to_string(),
            glob,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_literal_subscription() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&config("events", false)).await.unwrap();

        broker.produce("test.other", b"skip").unwrap();
        broker.produce("test.events", b"keep").unwrap();

        match sub.next_event().await {
            BrokerEvent::Message(msg) => {
                assert_eq!(msg.topic, "test.events");
                assert_eq!(msg.payload, b"keep");
                assert_eq!(msg.offset, 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_glob_subscription() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&config("events", true)).await.unwrap();

        broker.produce("test.events.eu", b"1").unwrap();
        broker.produce("test.eventsxyz", b"2").unwrap();
        broker.produce("prod.events", b"3").unwrap();
        broker.close_subscriptions();

        let mut topics = Vec::new();
        loop {
            match sub.next_event().await {
                BrokerEvent::Message(msg) => topics.push(msg.topic),
                BrokerEvent::Error(e) => {
                    assert_eq!(e, BrokerError::Closed);
                    break;
                }
            }
        }
        assert_eq!(topics, vec!["test.events.eu", "test.eventsxyz"]);
    }

    #[tokio::test]
    async fn test_closed_subscription_reports_once() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&config("events", false)).await.unwrap();
        broker.close_subscriptions();

        assert_eq!(sub.next_event().await, BrokerEvent::Error(BrokerError::Closed));
        let second = tokio::time::timeout(Duration::from_millis(20), sub.next_event()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_unreachable() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        assert!(broker.probe(Duration::from_secs(1)).is_err());
        assert!(broker.produce("t", b"x").is_err());
        assert!(broker.subscribe(&config("events", false)).await.is_err());

        broker.set_reachable(true);
        assert!(broker.probe(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_close_rejects_produce() {
        let broker = MemoryBroker::new();
        broker.close().unwrap();
        assert!(broker.is_closed());
        assert!(matches!(
            broker.produce("t", b"x"),
            Err(StreamError::PublishFailed(_))
        ));
    }

    #[test]
    fn test_history_keeps_latest() {
        let broker = MemoryBroker::with_history_limit(3);
        for i in 0..5u8 {
            broker.produce("test.events", &[i]).unwrap();
        }

        let history = broker.published();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].payload, vec![2]);
        assert_eq!(history[0].offset, 2);
        assert_eq!(broker.published_on("test.events").last(), Some(&vec![4]));
    }

    #[tokio::test]
    async fn test_history_disabled_still_delivers() {
        let broker = MemoryBroker::with_history_limit(0);
        let mut sub = broker.subscribe(&config("events", false)).await.unwrap();
        broker.produce("test.events", b"live").unwrap();

        assert!(broker.published().is_empty());
        assert!(matches!(sub.next_event().await, BrokerEvent::Message(m) if m.payload == b"live"));
    }

    #[test]
    fn test_default_history_is_bounded() {
        let broker = MemoryBroker::new();
        for _ in 0..DEFAULT_HISTORY_LIMIT + 10 {
            broker.produce("test.events", b"x").unwrap();
        }
        assert_eq!(broker.published().len(), DEFAULT_HISTORY_LIMIT);
    }
}
