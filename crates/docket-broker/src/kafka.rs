//! Kafka backend
//!
//! Producer writes are keyed so the partitioner keeps every message of an upload on one
//! partition. Consumers disable auto-commit and commit offset + 1 only when the pipeline
//! acknowledges a delivery.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};

use crate::traits::{Broker, BrokerError, BrokerResult, Delivery, Subscription};

pub struct KafkaBroker {
    bootstrap_servers: String,
    producer: FutureProducer,
}

impl KafkaBroker {
    pub fn new(bootstrap_servers: impl Into<String>) -> BrokerResult<Self> {
        let bootstrap_servers = bootstrap_servers.into();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &bootstrap_servers)
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| BrokerError::Config(format!("Failed to create producer: {}", e)))?;

        tracing::info!(bootstrap_servers = %bootstrap_servers, "Kafka producer created");

        Ok(Self {
            bootstrap_servers,
            producer,
        })
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> BrokerResult<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        let (partition, offset) = self
            .producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| BrokerError::Transport(e.to_string()))?;

        tracing::trace!(topic, partition, offset, bytes = payload.len(), "Message produced");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> BrokerResult<Box<dyn Subscription>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .create()
            .map_err(|e| BrokerError::Config(format!("Failed to create consumer: {}", e)))?;

        consumer.subscribe(&[topic]).map_err(|e| {
            BrokerError::Transport(format!("Failed to subscribe to {}: {}", topic, e))
        })?;

        tracing::info!(topic, group, "Kafka consumer subscribed");
        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn next(&mut self, timeout: Duration) -> BrokerResult<Option<Delivery>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(BrokerError::Transport(e.to_string())),
            Ok(Ok(message)) => Ok(Some(Delivery {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(|k| k.to_vec()),
                payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
            })),
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> BrokerResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset + 1),
            )
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }
}
