//! Postgres repositories

mod audit_log;
mod form;
mod sample_dataset;
mod user;

pub use audit_log::AuditLogRepository;
pub use form::FormRepository;
pub use sample_dataset::SampleDatasetRepository;
pub use user::UserRepository;
