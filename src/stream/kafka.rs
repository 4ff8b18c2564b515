//! Kafka broker implementation

use crate::stream::config::{StreamConfig, SESSION_TIMEOUT_MS};
use crate::stream::error::{StreamError, StreamResult};
use crate::stream::message::{BrokerError, BrokerEvent, BrokerMessage};
use crate::stream::traits::{Broker, ErrorHook, Publisher, Subscription};
use async_trait::async_trait;
use parking_lot::RwLock;
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consumer client settings derived from a stream config
pub fn consumer_config(config: &StreamConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("session.timeout.ms", SESSION_TIMEOUT_MS.to_string())
        .set("enable.auto.commit", "false")
        .set("enable.partition.eof", "true")
        .set("auto.offset.reset", config.offset.as_ref());
    client_config
}

/// Producer client settings derived from a stream config
pub fn producer_config(config: &StreamConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.brokers)
        .set("compression.codec", config.compression_codec())
        .set("session.timeout.ms", SESSION_TIMEOUT_MS.to_string());
    client_config
}

/// Kafka subscription factory
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaBroker;

impl KafkaBroker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    type Subscription = KafkaSubscription;

    async fn subscribe(&self, config: &StreamConfig) -> StreamResult<KafkaSubscription> {
        let config = config.clone();
        // client creation and the metadata round trip block for up to the session timeout
        tokio::task::spawn_blocking(move || subscribe_blocking(&config))
            .await
            .map_err(|e| StreamError::Task(e.to_string()))?
    }
}

fn subscribe_blocking(config: &StreamConfig) -> StreamResult<KafkaSubscription> {
    let consumer: StreamConsumer = consumer_config(config)
        .create()
        .map_err(|e| StreamError::ConnectionFailed(format!("Kafka consumer creation failed: {}", e)))?;

    // sanity check broker communication before handing out the subscription
    consumer
        .fetch_metadata(None, Duration::from_millis(SESSION_TIMEOUT_MS))
        .map_err(|e| StreamError::Unreachable(e.to_string()))?;

    let subscription = config.subscription();
    consumer
        .subscribe(&[subscription.as_str()])
        .map_err(|e| StreamError::SubscribeFailed(format!("Kafka subscribe failed: {}", e)))?;

    info!(
        brokers = %config.brokers,
        subscription = %subscription,
        group_id = %config.group_id,
        offset = %config.offset,
        "Kafka subscription established"
    );

    Ok(KafkaSubscription { consumer })
}

/// Subscription backed by an rdkafka `StreamConsumer`
pub struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next_event(&mut self) -> BrokerEvent {
        match self.consumer.recv().await {
            Ok(msg) => BrokerEvent::Message(BrokerMessage::from(&msg)),
            Err(e) => BrokerEvent::Error(BrokerError::from(e)),
        }
    }
}

/// Producer context forwarding client and delivery errors to the hook
pub struct PublisherContext {
    hook: RwLock<Option<ErrorHook>>,
    report_deliveries: bool,
}

impl PublisherContext {
    fn emit(&self, error: BrokerError) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(error);
        }
    }
}

impl ClientContext for PublisherContext {
    fn error(&self, error: KafkaError, reason: &str) {
        warn!(error = %error, reason = reason, "Kafka client error");
        self.emit(BrokerError::from(error));
    }
}

impl ProducerContext for PublisherContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        if !self.report_deliveries {
            return;
        }
        if let Err((err, msg)) = result {
            self.emit(BrokerError::Delivery {
                topic: msg.topic().to_string(),
                reason: err.to_string(),
            });
        }
    }
}

/// Kafka producer
pub struct KafkaPublisher {
    producer: RwLock<Option<ThreadedProducer<PublisherContext>>>,
}

impl KafkaPublisher {
    /// Create a new Kafka producer. Connectivity is not checked here; use
    /// [`Publisher::probe`].
    pub fn new(config: &StreamConfig) -> StreamResult<Self> {
        let context = PublisherContext {
            hook: RwLock::new(None),
            report_deliveries: config.delivery_reports,
        };

        let producer: ThreadedProducer<PublisherContext> = producer_config(config)
            .create_with_context(context)
            .map_err(|e| StreamError::ConnectionFailed(format!("Kafka producer creation failed: {}", e)))?;

        debug!(brokers = %config.brokers, codec = config.compression_codec(), "Kafka producer created");

        Ok(Self {
            producer: RwLock::new(Some(producer)),
        })
    }
}

impl Publisher for KafkaPublisher {
    fn produce(&self, topic: &str, payload: &[u8]) -> StreamResult<()> {
        let guard = self.producer.read();
        let producer = guard
            .as_ref()
            .ok_or_else(|| StreamError::PublishFailed("producer closed".to_string()))?;

        producer
            .send(BaseRecord::<(), [u8]>::to(topic).payload(payload))
            .map_err(|(e, _)| StreamError::PublishFailed(format!("Kafka publish failed: {}", e)))
    }

    fn probe(&self, timeout: Duration) -> StreamResult<()> {
        let guard = self.producer.read();
        let producer = guard
            .as_ref()
            .ok_or_else(|| StreamError::Unreachable("producer closed".to_string()))?;

        producer
            .client()
            .fetch_metadata(None, timeout)
            .map(|_| ())
            .map_err(|e| StreamError::Unreachable(e.to_string()))
    }

    fn flush(&self, timeout: Duration) -> StreamResult<()> {
        let guard = self.producer.read();
        match guard.as_ref() {
            Some(producer) => producer
                .flush(timeout)
                .map_err(|e| StreamError::FlushFailed(e.to_string())),
            None => Ok(()),
        }
    }

    fn close(&self) -> StreamResult<()> {
        if self.producer.write().take().is_some() {
            debug!("Kafka producer closed");
        }
        Ok(())
    }

    fn on_error(&self, hook: ErrorHook) {
        if let Some(producer) = self.producer.read().as_ref() {
            *producer.context().hook.write() = Some(hook);
        }
    }
}
