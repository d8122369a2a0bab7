//! Completion coordinator: side effects of a fully reassembled upload.
//!
//! Runs form persistence, then the audit event, then the sample-dataset index write. A
//! form failure skips the remaining steps so the index never points at a missing form.
//! The audit step runs on a background task and cannot hold up the index write.

use std::path::PathBuf;
use std::sync::Arc;

use docket_core::models::{
    AuditEvent, ChunkMessage, FormDocument, NewSampleDataset, SampleDatasetRow, UploadId,
};
use docket_db::{FormStore, SampleDatasetStore, UserDirectory};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audit::AuditPublisher;

/// Final state of an assembler, handed over once its terminal chunk is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblySummary {
    pub upload_id: UploadId,
    pub name: String,
    pub destination: PathBuf,
    pub chunks: u64,
    pub bytes: u64,
}

/// What the coordinator did for one upload.
#[derive(Debug, Default)]
pub struct CompletionReport {
    pub form: Option<FormDocument>,
    pub sample_dataset: Option<SampleDatasetRow>,
    /// Background audit task, when the upload qualified for one.
    pub audit_task: Option<JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct CompletionCoordinator {
    forms: Option<Arc<dyn FormStore>>,
    sample_datasets: Option<Arc<dyn SampleDatasetStore>>,
    users: Option<Arc<dyn UserDirectory>>,
    audit: Option<AuditPublisher>,
}

impl CompletionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form_store(mut self, forms: Arc<dyn FormStore>) -> Self {
        self.forms = Some(forms);
        self
    }

    pub fn with_sample_dataset_store(mut self, sample_datasets: Arc<dyn SampleDatasetStore>) -> Self {
        self.sample_datasets = Some(sample_datasets);
        self
    }

    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn with_audit_publisher(mut self, audit: AuditPublisher) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Runs the completion steps for `summary`, using the form data of `terminal`.
    ///
    /// Store writes are not tied to worker cancellation; once started they run to the end.
    #[tracing::instrument(skip_all, fields(upload_id = %summary.upload_id, name = %summary.name))]
    pub async fn complete(
        &self,
        summary: &AssemblySummary,
        terminal: &ChunkMessage,
    ) -> CompletionReport {
        let mut report = CompletionReport::default();

        let Some(forms) = self.forms.as_ref() else {
            tracing::info!("No form store configured, upload saved to disk only");
            return report;
        };
        if !terminal.form_data.has_fields() {
            tracing::info!("Upload carries no form data, skipping form and index");
            return report;
        }

        let form = match forms.create_form(&terminal.form_data).await {
            Ok(form) => form,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create form, skipping audit and index");
                return report;
            }
        };
        tracing::info!(form_id = %form.id, form_type = %form.form_type, "Form created");

        if form.form_type.is_dataset() && !terminal.user_id.trim().is_empty() {
            report.audit_task = self.dispatch_audit(summary, terminal, &form);
        }

        if let Some(sample_datasets) = self.sample_datasets.as_ref() {
            let dataset = NewSampleDataset {
                name: summary.name.clone(),
                internal_uuid: summary.upload_id,
                external_uuid: form.id,
            };
            match sample_datasets.create_sample_dataset(dataset).await {
                Ok(row) => {
                    tracing::info!(sample_dataset_id = %row.id, "Sample dataset indexed");
                    report.sample_dataset = Some(row);
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        form_id = %form.id,
                        "Failed to index sample dataset, form and file remain"
                    );
                }
            }
        }

        report.form = Some(form);
        report
    }

    fn dispatch_audit(
        &self,
        summary: &AssemblySummary,
        terminal: &ChunkMessage,
        form: &FormDocument,
    ) -> Option<JoinHandle<()>> {
        let Some(audit) = self.audit.clone() else {
            tracing::debug!("No audit publisher configured");
            return None;
        };
        let Some(users) = self.users.clone() else {
            tracing::debug!("No user directory configured, audit skipped");
            return None;
        };
        let user_id = match Uuid::parse_str(terminal.user_id.trim()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(user_id = %terminal.user_id, error = %e, "Invalid user id, audit skipped");
                return None;
            }
        };

        let dataset = summary.name.clone();
        let form = form.clone();
        Some(tokio::spawn(async move {
            let user = match users.get_user_by_id(user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::warn!(%user_id, "User not found, audit skipped");
                    return;
                }
                Err(e) => {
                    tracing::error!(%user_id, error = %e, "User lookup failed, audit skipped");
                    return;
                }
            };
            let role = match users.get_role_by_id(user.role_id).await {
                Ok(Some(role)) => role,
                Ok(None) => {
                    tracing::warn!(role_id = %user.role_id, "Role not found, audit skipped");
                    return;
                }
                Err(e) => {
                    tracing::error!(role_id = %user.role_id, error = %e, "Role lookup failed, audit skipped");
                    return;
                }
            };

            let event = AuditEvent::dataset_created(&dataset, &form, &user, &role);
            if let Err(e) = audit.publish(&event).await {
                tracing::error!(error = %e, form_id = %form.id, "Failed to publish audit event");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_broker::MemoryBroker;
    use docket_core::models::{FormData, FormType, Role, User};
    use docket_db::{InMemoryFormStore, InMemorySampleDatasetStore, InMemoryUserDirectory};
    use serde_json::json;

    struct Fixture {
        forms: InMemoryFormStore,
        datasets: InMemorySampleDatasetStore,
        broker: MemoryBroker,
        user: User,
        coordinator: CompletionCoordinator,
    }

    fn fixture() -> Fixture {
        let forms = InMemoryFormStore::new();
        let datasets = InMemorySampleDatasetStore::new();
        let users = InMemoryUserDirectory::new();
        let role = Role {
            id: Uuid::new_v4(),
            name: "Admin".to_string(),
        };
        let user = User {
            id: Uuid::new_v4(),
            user_name: "ada".to_string(),
            email: None,
            role_id: role.id,
        };
        users.add_role(role);
        users.add_user(user.clone());
        let broker = MemoryBroker::new();

        let coordinator = CompletionCoordinator::new()
            .with_form_store(Arc::new(forms.clone()))
            .with_sample_dataset_store(Arc::new(datasets.clone()))
            .with_user_directory(Arc::new(users))
            .with_audit_publisher(AuditPublisher::new(Arc::new(broker.clone()), "audit"));

        Fixture {
            forms,
            datasets,
            broker,
            user,
            coordinator,
        }
    }

    fn terminal(form_data: FormData, user_id: &str) -> (AssemblySummary, ChunkMessage) {
        let upload_id = UploadId::new();
        let summary = AssemblySummary {
            upload_id,
            name: "cats".to_string(),
            destination: PathBuf::from("/tmp/cats"),
            chunks: 1,
            bytes: 3,
        };
        let chunk = ChunkMessage {
            name: "cats".to_string(),
            uuid: upload_id,
            is_last_chunk: true,
            filepath: "/tmp/cats".to_string(),
            chunk_data: b"abc".to_vec(),
            chunk_index: 0,
            form_data,
            user_name: "ada".to_string(),
            user_id: user_id.to_string(),
        };
        (summary, chunk)
    }

    fn dataset_form() -> FormData {
        serde_json::from_value(json!({"type": 2, "title": "cats"})).unwrap()
    }

    #[tokio::test]
    async fn dataset_upload_creates_form_index_and_audit() {
        let fx = fixture();
        let (summary, chunk) = terminal(dataset_form(), &fx.user.id.to_string());

        let report = fx.coordinator.complete(&summary, &chunk).await;
        report.audit_task.expect("audit dispatched").await.unwrap();

        let form = report.form.unwrap();
        let row = report.sample_dataset.unwrap();
        assert_eq!(row.internal_uuid, summary.upload_id);
        assert_eq!(row.external_uuid, form.id);

        let events = fx.broker.messages("audit");
        assert_eq!(events.len(), 1);
        let event = AuditEvent::from_slice(&events[0].payload).unwrap();
        assert_eq!(event.details["form_id"], form.id.to_string());
        assert_eq!(event.user_role, "Admin");
    }

    #[tokio::test]
    async fn form_failure_skips_audit_and_index() {
        let fx = fixture();
        fx.forms.set_failing(true);
        let (summary, chunk) = terminal(dataset_form(), &fx.user.id.to_string());

        let report = fx.coordinator.complete(&summary, &chunk).await;
        assert!(report.form.is_none());
        assert!(report.audit_task.is_none());
        assert!(fx.datasets.all().is_empty());
    }

    #[tokio::test]
    async fn index_failure_keeps_form() {
        let fx = fixture();
        fx.datasets.set_failing(true);
        let (summary, chunk) = terminal(dataset_form(), "");

        let report = fx.coordinator.complete(&summary, &chunk).await;
        assert!(report.form.is_some());
        assert!(report.sample_dataset.is_none());
        assert_eq!(fx.forms.len(), 1);
    }

    #[tokio::test]
    async fn non_dataset_form_or_missing_user_has_no_audit() {
        let fx = fixture();
        let plain: FormData = serde_json::from_value(json!({"type": 1, "title": "x"})).unwrap();
        let (summary, chunk) = terminal(plain, &fx.user.id.to_string());
        let report = fx.coordinator.complete(&summary, &chunk).await;
        assert!(report.audit_task.is_none());
        assert_eq!(report.form.unwrap().form_type, FormType(1));

        let (summary, chunk) = terminal(dataset_form(), "");
        let report = fx.coordinator.complete(&summary, &chunk).await;
        assert!(report.audit_task.is_none());
        assert!(fx.broker.messages("audit").is_empty());
    }

    #[tokio::test]
    async fn unknown_user_skips_audit_but_indexes() {
        let fx = fixture();
        let (summary, chunk) = terminal(dataset_form(), &Uuid::new_v4().to_string());

        let report = fx.coordinator.complete(&summary, &chunk).await;
        report.audit_task.expect("audit dispatched").await.unwrap();
        assert!(report.sample_dataset.is_some());
        assert!(fx.broker.messages("audit").is_empty());
    }

    #[tokio::test]
    async fn empty_form_data_writes_nothing() {
        let fx = fixture();
        let (summary, chunk) = terminal(FormData::default(), &fx.user.id.to_string());

        let report = fx.coordinator.complete(&summary, &chunk).await;
        assert!(report.form.is_none());
        assert!(fx.forms.is_empty());
        assert!(fx.datasets.all().is_empty());
    }
}
