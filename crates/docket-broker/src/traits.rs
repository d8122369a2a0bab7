//! Broker abstraction traits

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Broker operation errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection or protocol failure; the operation may succeed if retried.
    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    Decode(String),

    /// The broker was shut down; no further messages will arrive.
    #[error("Broker closed")]
    Closed,

    #[error("Broker configuration error: {0}")]
    Config(String),
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// A message handed to a subscriber, with the coordinates needed to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Topic writer and consumer-group reader factory.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append `payload` to `topic`. Messages sharing `key` keep their relative order.
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> BrokerResult<()>;

    /// Join `group` on `topic`. A group that has never committed starts from the
    /// earliest retained message.
    async fn subscribe(&self, topic: &str, group: &str) -> BrokerResult<Box<dyn Subscription>>;
}

/// One consumer within a consumer group.
#[async_trait]
pub trait Subscription: Send {
    /// Waits up to `timeout` for the next message. `Ok(None)` means the wait timed out.
    async fn next(&mut self, timeout: Duration) -> BrokerResult<Option<Delivery>>;

    /// Commits `delivery` for the group. Until then it may be redelivered.
    async fn ack(&mut self, delivery: &Delivery) -> BrokerResult<()>;
}
