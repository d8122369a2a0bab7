//! Worker wiring: stores, brokers and the long-running tasks.

use std::sync::Arc;

use anyhow::{Context, Result};
use docket_broker::{create_broker_pair, BrokerPair};
use docket_core::WorkerConfig;
use docket_db::{
    connect_and_migrate, AuditLogRepository, AuditLogStore, FormRepository,
    SampleDatasetRepository, UserRepository,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assembler::ChunkAssembler;
use crate::audit::{AuditPublisher, AuditSink};
use crate::consumer::ConsumerLoop;
use crate::coordinator::CompletionCoordinator;
use crate::janitor::AssemblerJanitor;
use crate::producer::PathProducer;
use crate::registry::AssemblerRegistry;

/// Everything the pipeline tasks depend on.
pub struct PipelineComponents {
    pub brokers: BrokerPair,
    pub coordinator: CompletionCoordinator,
    /// Store for the audit sink; the sink only runs when this is set.
    pub audit_store: Option<Arc<dyn AuditLogStore>>,
}

impl PipelineComponents {
    /// Connects brokers and, when `DATABASE_URL` is set, the Postgres stores.
    pub async fn from_config(config: &WorkerConfig) -> Result<Self> {
        let brokers =
            create_broker_pair(&config.broker).context("Failed to create broker clients")?;
        let audit = AuditPublisher::new(brokers.private.clone(), config.audit_topic.clone());

        let mut coordinator = CompletionCoordinator::new().with_audit_publisher(audit);
        let mut audit_store: Option<Arc<dyn AuditLogStore>> = None;

        if let Some(pool) = connect_and_migrate(config).await? {
            coordinator = coordinator
                .with_form_store(Arc::new(FormRepository::new(pool.clone())))
                .with_sample_dataset_store(Arc::new(SampleDatasetRepository::new(pool.clone())))
                .with_user_directory(Arc::new(UserRepository::new(pool.clone())));
            if config.audit_sink_enabled {
                audit_store = Some(Arc::new(AuditLogRepository::new(pool)));
            }
        }

        Ok(Self {
            brokers,
            coordinator,
            audit_store,
        })
    }
}

/// Running pipeline tasks.
pub struct Pipeline {
    registry: AssemblerRegistry,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts the path producer, the chunk assembler, the janitor and, when configured,
    /// the audit sink. All of them stop when `cancel` fires.
    pub fn spawn(
        config: &WorkerConfig,
        components: PipelineComponents,
        cancel: CancellationToken,
    ) -> Self {
        let PipelineComponents {
            brokers,
            coordinator,
            audit_store,
        } = components;
        let registry = AssemblerRegistry::new();
        let mut handles = Vec::new();

        let producer_cancel = cancel.child_token();
        let producer = PathProducer::new(
            brokers.private.clone(),
            config.chunk_topic.clone(),
            config.destination_dir(),
        )
        .with_cancellation(producer_cancel.clone());
        handles.push(
            ConsumerLoop::new("path-producer", &config.path_topic, &config.path_consumer_group)
                .with_poll_timeout(config.broker_poll_timeout())
                .with_retry_backoff(config.broker_retry_backoff())
                .spawn(brokers.public.clone(), Arc::new(producer), producer_cancel),
        );

        let assembler = ChunkAssembler::new(
            registry.clone(),
            config.dataset_default_dir.clone(),
            Arc::new(coordinator),
        );
        handles.push(
            ConsumerLoop::new(
                "chunk-assembler",
                &config.chunk_topic,
                &config.chunk_consumer_group,
            )
            .with_poll_timeout(config.broker_poll_timeout())
            .with_retry_backoff(config.broker_retry_backoff())
            .spawn(brokers.private.clone(), Arc::new(assembler), cancel.child_token()),
        );

        if let Some(store) = audit_store {
            handles.push(
                ConsumerLoop::new("audit-sink", &config.audit_topic, &config.audit_consumer_group)
                    .with_poll_timeout(config.broker_poll_timeout())
                    .with_retry_backoff(config.broker_retry_backoff())
                    .spawn(
                        brokers.private.clone(),
                        Arc::new(AuditSink::new(store)),
                        cancel.child_token(),
                    ),
            );
        }

        let janitor = AssemblerJanitor::new(
            registry.clone(),
            config.janitor_interval(),
            config.assembler_stale_after(),
        )
        .with_completed_retention(config.assembler_completed_retention());
        handles.push(janitor.start(cancel.child_token()));

        Self { registry, handles }
    }

    pub fn registry(&self) -> &AssemblerRegistry {
        &self.registry
    }

    /// Waits for every task to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Pipeline task panicked");
            }
        }
    }
}

/// Runs the worker until `cancel` fires.
pub async fn run(config: WorkerConfig, cancel: CancellationToken) -> Result<()> {
    tracing::info!(
        backend = %config.broker.backend,
        path_topic = %config.path_topic,
        chunk_topic = %config.chunk_topic,
        audit_sink = config.audit_sink_enabled,
        "Starting dataset ingestion worker"
    );

    let components = PipelineComponents::from_config(&config).await?;
    let pipeline = Pipeline::spawn(&config, components, cancel.clone());

    cancel.cancelled().await;
    tracing::info!("Waiting for pipeline tasks to stop");
    pipeline.join().await;
    tracing::info!("Worker stopped");
    Ok(())
}
