//! Docket Core Library
//!
//! Domain models, wire messages, configuration and the shared error type used by
//! the ingest gateway and the storage-side worker.

pub mod broker_types;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use broker_types::BrokerBackend;
pub use config::{BrokerConfig, GatewayConfig, WorkerConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    AuditEvent, ChunkMessage, FormData, FormDocument, FormType, NewSampleDataset, PathMessage,
    Role, SampleDatasetRow, UploadId, User,
};
