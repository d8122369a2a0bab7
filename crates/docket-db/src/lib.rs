//! Collaborator stores used by the completion step and the audit sink.
//!
//! Each store is a narrow trait with a Postgres repository behind it and an in-memory
//! implementation for tests and database-less runs.

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod traits;

pub use connection::connect_and_migrate;
pub use memory::{
    InMemoryAuditLogStore, InMemoryFormStore, InMemorySampleDatasetStore, InMemoryUserDirectory,
};
pub use repositories::{
    AuditLogRepository, FormRepository, SampleDatasetRepository, UserRepository,
};
pub use traits::{AuditLogStore, FormStore, SampleDatasetStore, UserDirectory};
