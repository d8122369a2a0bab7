//! Docket Broker Library
//!
//! Keyed, partitioned, at-least-once message transport used between the gateway and the
//! worker. Messages with the same key always land on the same partition and are handed
//! out in publication order; a consumer group only moves past a message once it has been
//! acknowledged.
//!
//! Two backends implement [`Broker`]: an in-process [`MemoryBroker`] and, behind the
//! `kafka` feature, a Kafka client.

pub mod factory;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use docket_core::BrokerBackend;
pub use factory::{create_broker, create_broker_pair, BrokerPair};
#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use memory::MemoryBroker;
pub use traits::{Broker, BrokerError, BrokerResult, Delivery, Subscription};
