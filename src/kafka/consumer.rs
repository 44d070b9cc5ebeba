use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::normalizer::{Normalizer, RecordSink};
use crate::{Error, Result};

/// Subscribes to the change topic and feeds every message to a [`Normalizer`].
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaConsumer {
    /// Creates the consumer and subscribes.
    ///
    /// A fresh consumer group starts at the end of the topic
    /// (`auto.offset.reset=latest`); history is never replayed.
    pub fn new(kafka: &KafkaConfig, config: &ConsumerConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", kafka.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "true")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(Error::Kafka)?;

        consumer.subscribe(&[kafka.topic.as_str()]).map_err(Error::Kafka)?;
        info!(topic = %kafka.topic, group = %config.group_id, "Subscribed to topic");

        Ok(Self {
            consumer,
            topic: kafka.topic.clone(),
        })
    }

    /// Fetches topic metadata so an unreachable broker fails startup.
    pub fn verify_connectivity(&self, timeout: Duration) -> Result<()> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(self.topic.as_str()), timeout)
            .map_err(Error::Kafka)?;

        info!(
            topic = %self.topic,
            brokers = metadata.brokers().len(),
            "Connected to Kafka"
        );
        Ok(())
    }

    /// Consumes until `shutdown` resolves or the stream ends.
    ///
    /// Receive errors and bad messages are logged and skipped; a message
    /// already being normalized when shutdown fires is finished first.
    pub async fn run<S, F>(&self, normalizer: &mut Normalizer<S>, shutdown: F) -> Result<()>
    where
        S: RecordSink,
        F: Future<Output = ()>,
    {
        let mut stream = self.consumer.stream();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        debug!(
                            partition = message.partition(),
                            offset = message.offset(),
                            "Message received"
                        );
                        normalizer.process(message.payload());
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Error receiving message");
                    }
                    None => {
                        warn!("Consumer stream ended");
                        break;
                    }
                },
            }
        }

        info!(
            processed = normalizer.processed(),
            unrecognized = normalizer.unrecognized(),
            "Consumer stopped"
        );
        Ok(())
    }
}
