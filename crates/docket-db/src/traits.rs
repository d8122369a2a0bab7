use async_trait::async_trait;
use docket_core::models::{
    AuditEvent, FormData, FormDocument, NewSampleDataset, Role, SampleDatasetRow, UploadId, User,
};
use docket_core::AppError;
use uuid::Uuid;

/// Form documents created when an upload completes.
#[async_trait]
pub trait FormStore: Send + Sync {
    /// Persists `form` and returns the stored document with its server-assigned id.
    async fn create_form(&self, form: &FormData) -> Result<FormDocument, AppError>;

    async fn get_form_by_id(&self, id: Uuid) -> Result<Option<FormDocument>, AppError>;
}

/// Index linking upload ids to form ids.
#[async_trait]
pub trait SampleDatasetStore: Send + Sync {
    async fn create_sample_dataset(
        &self,
        dataset: NewSampleDataset,
    ) -> Result<SampleDatasetRow, AppError>;

    async fn list_by_internal_uuid(
        &self,
        internal_uuid: UploadId,
    ) -> Result<Vec<SampleDatasetRow>, AppError>;
}

/// Read-only view of users and roles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn get_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError>;
}

/// Durable audit trail fed by the audit sink.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError>;
}
