//! Audit events: publishing from the completion step and persisting from the audit topic.

use std::sync::Arc;

use async_trait::async_trait;
use docket_broker::{Broker, Delivery};
use docket_core::models::AuditEvent;
use docket_db::AuditLogStore;

use crate::consumer::MessageHandler;
use crate::error::PipelineError;

/// Publishes audit events on the audit topic.
#[derive(Clone)]
pub struct AuditPublisher {
    broker: Arc<dyn Broker>,
    topic: String,
}

impl AuditPublisher {
    pub fn new(broker: Arc<dyn Broker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
        }
    }

    pub async fn publish(&self, event: &AuditEvent) -> Result<(), PipelineError> {
        let payload = event.to_bytes().map_err(|source| PipelineError::Encode {
            kind: "audit",
            source,
        })?;
        self.broker
            .publish(&self.topic, event.user_id.as_bytes(), &payload)
            .await?;

        tracing::info!(
            topic = %self.topic,
            activity = %event.activity,
            dataset = %event.dataset,
            user_id = %event.user_id,
            "Audit event published"
        );
        Ok(())
    }
}

/// Persists audit events consumed from the audit topic.
pub struct AuditSink {
    store: Arc<dyn AuditLogStore>,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for AuditSink {
    async fn handle(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        let event =
            AuditEvent::from_slice(&delivery.payload).map_err(|source| PipelineError::Decode {
                kind: "audit",
                source,
            })?;
        self.store.insert_audit_event(&event).await?;
        tracing::debug!(activity = %event.activity, dataset = %event.dataset, "Audit event stored");
        Ok(())
    }
}
