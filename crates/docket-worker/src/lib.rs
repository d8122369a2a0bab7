//! Storage-side half of the dataset ingestion pipeline.
//!
//! - [`producer`]: reads staged files announced on the public broker and republishes them
//!   as ordered chunks on the private broker.
//! - [`assembler`]: rebuilds each upload on disk from its chunks.
//! - [`coordinator`]: runs the completion side effects once an upload is whole.
//! - [`janitor`]: evicts assemblers that stopped receiving chunks.
//! - [`audit`]: publishes audit events and persists them from the audit topic.
//!
//! [`consumer`] holds the broker read loop all three consumers share, and [`setup`] wires
//! everything together from a [`docket_core::WorkerConfig`].

pub mod assembler;
pub mod audit;
pub mod consumer;
pub mod coordinator;
pub mod error;
pub mod janitor;
pub mod producer;
pub mod registry;
pub mod setup;

pub use assembler::{ChunkAssembler, ChunkOutcome};
pub use audit::{AuditPublisher, AuditSink};
pub use consumer::{ConsumerLoop, MessageHandler};
pub use coordinator::{AssemblySummary, CompletionCoordinator, CompletionReport};
pub use error::{Disposition, PipelineError};
pub use janitor::{AssemblerJanitor, SweepReport};
pub use producer::{PathProducer, ProduceReport, CHUNK_SIZE};
pub use registry::AssemblerRegistry;
pub use setup::{run, Pipeline, PipelineComponents};
