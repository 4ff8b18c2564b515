use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use streamkit::stream::{
    consume, BrokerError, BrokerMessage, ConsumeError, MemoryBroker, Publisher, Session, StreamConfig,
    StreamConsumer,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("collector: {0}")]
struct CollectorError(String);

/// Collects what the driver hands it
#[derive(Default)]
struct Collector {
    token: CancellationToken,
    subscription: String,
    topics: Vec<String>,
    errors: Vec<BrokerError>,
    intervals: usize,
    processed: usize,
    finished: usize,
    stop_after_messages: Option<usize>,
    reject_payload: Option<Vec<u8>>,
}

#[async_trait]
impl StreamConsumer for Collector {
    type Config = String;
    type Output = Vec<String>;
    type Error = CollectorError;

    async fn start(&mut self, session: &Session, label: String) -> Result<(), CollectorError> {
        assert_eq!(session.messages(), 0);
        self.subscription = format!("{}:{}", label, session.subscription());
        Ok(())
    }

    async fn message(&mut self, msg: BrokerMessage) -> Result<(), CollectorError> {
        if self.reject_payload.as_deref() == Some(msg.payload.as_slice()) {
            return Err(CollectorError("rejected".to_string()));
        }
        self.topics.push(msg.topic);
        Ok(())
    }

    async fn interval(&mut self, _now: DateTime<Utc>) -> Result<(), CollectorError> {
        self.intervals += 1;
        Ok(())
    }

    async fn error(&mut self, err: BrokerError) -> bool {
        let stop = !err.is_end_of_stream() || err == BrokerError::Closed;
        self.errors.push(err);
        stop
    }

    async fn process(&mut self) -> Result<bool, CollectorError> {
        self.processed += 1;
        Ok(matches!(self.stop_after_messages, Some(n) if self.topics.len() >= n))
    }

    async fn finish(&mut self) -> Result<Vec<String>, CollectorError> {
        self.finished += 1;
        Ok(self.topics.clone())
    }

    fn done(&self) -> CancellationToken {
        self.token.clone()
    }
}

fn stream(topic: &str, glob: bool) -> StreamConfig {
    StreamConfig {
        prefix: "it".to_string(),
        topic: topic.to_string(),
        glob,
        ..Default::default()
    }
}

async fn wait_for_subscriber(broker: &MemoryBroker) {
    while broker.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }
}

/// Glob subscriptions see every topic sharing the prefix, in publish order
#[tokio::test]
async fn test_glob_subscription_in_order() {
    let broker = MemoryBroker::new();
    let mut collector = Collector {
        stop_after_messages: Some(3),
        ..Default::default()
    };

    let producer = broker.clone();
    tokio::spawn(async move {
        wait_for_subscriber(&producer).await;
        producer.produce("it.orders.eu", b"1").unwrap();
        producer.produce("it.payments", b"skipped").unwrap();
        producer.produce("it.orders.us", b"2").unwrap();
        producer.produce("it.orders", b"3").unwrap();
    });

    let topics = consume(&broker, &stream("orders", true), &mut collector, "glob".to_string())
        .await
        .unwrap();

    assert_eq!(topics, vec!["it.orders.eu", "it.orders.us", "it.orders"]);
    assert_eq!(collector.subscription, r"glob:^it\.orders.*");
    assert_eq!(collector.processed, 3);
    assert_eq!(collector.finished, 1);
}

/// End-of-partition is not fatal, any other error stops the run
#[tokio::test]
async fn test_broker_errors_reach_consumer() {
    let broker = MemoryBroker::new();
    let mut collector = Collector::default();

    let producer = broker.clone();
    tokio::spawn(async move {
        wait_for_subscriber(&producer).await;
        producer.produce("it.orders", b"a").unwrap();
        producer.inject_error(BrokerError::PartitionEof { partition: 2 });
        producer.produce("it.orders", b"b").unwrap();
        producer.inject_error(BrokerError::Other("broker hiccup".to_string()));
        producer.produce("it.orders", b"never seen").unwrap();
    });

    let topics = consume(&broker, &stream("orders", false), &mut collector, String::new())
        .await
        .unwrap();

    assert_eq!(topics.len(), 2);
    assert_eq!(
        collector.errors,
        vec![
            BrokerError::PartitionEof { partition: 2 },
            BrokerError::Other("broker hiccup".to_string())
        ]
    );
    assert_eq!(collector.processed, 4);
    assert_eq!(collector.finished, 1);
}

/// A closed stream is delivered to the consumer as an error event
#[tokio::test]
async fn test_closed_stream() {
    let broker = MemoryBroker::new();
    let mut collector = Collector::default();

    let producer = broker.clone();
    tokio::spawn(async move {
        wait_for_subscriber(&producer).await;
        producer.produce("it.orders", b"last").unwrap();
        producer.close_subscriptions();
    });

    let topics = consume(&broker, &stream("orders", false), &mut collector, String::new())
        .await
        .unwrap();

    assert_eq!(topics, vec!["it.orders"]);
    assert_eq!(collector.errors, vec![BrokerError::Closed]);
}

/// A message callback error stops the loop but finish still runs
#[tokio::test]
async fn test_message_error_stops_loop() {
    let broker = MemoryBroker::new();
    let mut collector = Collector {
        reject_payload: Some(b"poison".to_vec()),
        ..Default::default()
    };

    let producer = broker.clone();
    tokio::spawn(async move {
        wait_for_subscriber(&producer).await;
        producer.produce("it.orders", b"ok").unwrap();
        producer.produce("it.orders", b"poison").unwrap();
        producer.produce("it.orders", b"ok").unwrap();
    });

    let topics = consume(&broker, &stream("orders", false), &mut collector, String::new())
        .await
        .unwrap();

    assert_eq!(topics.len(), 1);
    assert_eq!(collector.finished, 1);
}

/// Cancelling from outside ends a run that would otherwise wait forever
#[tokio::test(start_paused = true)]
async fn test_external_cancellation() {
    let broker = MemoryBroker::new();
    let token = CancellationToken::new();
    let mut collector = Collector {
        token: token.clone(),
        ..Default::default()
    };
    let config = StreamConfig {
        interval_ms: 1000,
        ..stream("orders", false)
    };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5500)).await;
        token.cancel();
    });

    let topics = consume(&broker, &config, &mut collector, String::new()).await.unwrap();

    assert!(topics.is_empty());
    assert_eq!(collector.intervals, 5);
    // one process per interval tick plus one for the cancellation
    assert_eq!(collector.processed, 6);
    assert_eq!(collector.finished, 1);
}

/// Setup failures surface before any callback
#[tokio::test]
async fn test_unreachable_broker() {
    let broker = MemoryBroker::new();
    broker.set_reachable(false);
    let mut collector = Collector::default();

    let result = consume(&broker, &stream("orders", false), &mut collector, String::new()).await;

    assert!(matches!(result, Err(ConsumeError::Broker(_))));
    assert!(collector.subscription.is_empty());
    assert_eq!(collector.finished, 0);
}
