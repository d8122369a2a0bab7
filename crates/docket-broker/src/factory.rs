#[cfg(feature = "kafka")]
use crate::KafkaBroker;
use crate::{Broker, BrokerBackend, BrokerError, BrokerResult, MemoryBroker};
use docket_core::BrokerConfig;
use std::sync::Arc;

/// The public broker carries staged-file announcements, the private one carries chunks and
/// audit events. With the in-memory backend both are the same instance.
#[derive(Clone)]
pub struct BrokerPair {
    pub public: Arc<dyn Broker>,
    pub private: Arc<dyn Broker>,
}

/// Create a broker client for a single cluster
pub fn create_broker(
    backend: BrokerBackend,
    address: Option<&str>,
) -> BrokerResult<Arc<dyn Broker>> {
    match backend {
        #[cfg(feature = "kafka")]
        BrokerBackend::Kafka => {
            let address = address.ok_or_else(|| {
                BrokerError::Config("Kafka broker address not configured".to_string())
            })?;
            Ok(Arc::new(KafkaBroker::new(address)?))
        }

        #[cfg(not(feature = "kafka"))]
        BrokerBackend::Kafka => {
            let _ = address;
            Err(BrokerError::Config(
                "Kafka broker backend not available (kafka feature not enabled)".to_string(),
            ))
        }

        BrokerBackend::Memory => Ok(Arc::new(MemoryBroker::new())),
    }
}

/// Create the public and private broker clients the worker needs
pub fn create_broker_pair(config: &BrokerConfig) -> BrokerResult<BrokerPair> {
    match config.backend {
        BrokerBackend::Memory => {
            let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
            Ok(BrokerPair {
                public: broker.clone(),
                private: broker,
            })
        }
        BrokerBackend::Kafka => Ok(BrokerPair {
            public: create_broker(config.backend, config.public_address.as_deref())?,
            private: create_broker(config.backend, config.private_address.as_deref())?,
        }),
    }
}
