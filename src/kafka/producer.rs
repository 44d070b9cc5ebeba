use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{debug, info};

use super::{JsonSerializer, KeyStrategy};
use crate::{config::KafkaConfig, postgres::ChangeEvent, Error, Result};

/// Destination for detected changes.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &ChangeEvent) -> Result<()>;

    /// Waits for buffered messages to be delivered, up to `timeout`.
    async fn flush(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    key_strategy: KeyStrategy,
    send_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("client.id", &config.client_id)
            .set("compression.type", &config.compression)
            .set("acks", &config.acks)
            .set("linger.ms", config.linger_ms.to_string())
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(Error::Kafka)?;

        let key_strategy = if config.key_field.is_empty() {
            KeyStrategy::Timestamp
        } else {
            KeyStrategy::TableField(config.key_field.clone())
        };

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            key_strategy,
            send_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }

    /// Fetches cluster metadata once so an unreachable broker fails startup.
    pub fn verify_connectivity(&self, timeout: Duration) -> Result<()> {
        let metadata = self
            .producer
            .client()
            .fetch_metadata(Some(self.topic.as_str()), timeout)
            .map_err(Error::Kafka)?;

        info!(
            topic = %self.topic,
            brokers = metadata.brokers().len(),
            "Connected to Kafka"
        );
        Ok(())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn send(&self, key: &str, payload: &str) -> Result<()> {
        let record = FutureRecord::to(&self.topic).payload(payload).key(key);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        debug!(key, partition, offset, "Message delivered");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaProducer {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let payload = JsonSerializer::serialize(event)?;
        let key = self.key_strategy.extract_key(event);
        self.send(&key, &payload).await
    }

    /// librdkafka's flush blocks the calling thread, so it runs on the
    /// blocking pool instead of a runtime worker.
    async fn flush(&self, timeout: Duration) -> Result<()> {
        info!(timeout_ms = timeout.as_millis() as u64, "Flushing Kafka producer");
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| Error::Connection(format!("Producer flush task failed: {}", e)))?
            .map_err(Error::Kafka)
    }
}
