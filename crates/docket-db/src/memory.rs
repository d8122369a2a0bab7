//! In-memory stores
//!
//! Same contracts as the Postgres repositories, backed by `Arc<Mutex<..>>` maps. Used by
//! the pipeline tests and when the worker runs without a database. Each store can be
//! switched into a failing mode to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use docket_core::models::{
    AuditEvent, FormData, FormDocument, NewSampleDataset, Role, SampleDatasetRow, UploadId, User,
};
use docket_core::AppError;
use uuid::Uuid;

use crate::traits::{AuditLogStore, FormStore, SampleDatasetStore, UserDirectory};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory form store
#[derive(Clone, Default)]
pub struct InMemoryFormStore {
    forms: Arc<Mutex<HashMap<Uuid, FormDocument>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryFormStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a database-style error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<FormDocument> {
        lock(&self.forms).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.forms).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FormStore for InMemoryFormStore {
    async fn create_form(&self, form: &FormData) -> Result<FormDocument, AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("form store unavailable".to_string()));
        }
        let document = FormDocument::from_form_data(form);
        lock(&self.forms).insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_form_by_id(&self, id: Uuid) -> Result<Option<FormDocument>, AppError> {
        Ok(lock(&self.forms).get(&id).cloned())
    }
}

/// In-memory sample-dataset index
#[derive(Clone, Default)]
pub struct InMemorySampleDatasetStore {
    rows: Arc<Mutex<Vec<SampleDatasetRow>>>,
    failing: Arc<AtomicBool>,
}

impl InMemorySampleDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<SampleDatasetRow> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl SampleDatasetStore for InMemorySampleDatasetStore {
    async fn create_sample_dataset(
        &self,
        dataset: NewSampleDataset,
    ) -> Result<SampleDatasetRow, AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("dataset store unavailable".to_string()));
        }
        let row = SampleDatasetRow {
            id: Uuid::new_v4(),
            name: dataset.name,
            internal_uuid: dataset.internal_uuid,
            external_uuid: dataset.external_uuid,
            created_at: Utc::now(),
        };
        lock(&self.rows).push(row.clone());
        Ok(row)
    }

    async fn list_by_internal_uuid(
        &self,
        internal_uuid: UploadId,
    ) -> Result<Vec<SampleDatasetRow>, AppError> {
        Ok(lock(&self.rows)
            .iter()
            .filter(|row| row.internal_uuid == internal_uuid)
            .cloned()
            .collect())
    }
}

/// In-memory users and roles
#[derive(Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    roles: Arc<Mutex<HashMap<Uuid, Role>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        lock(&self.users).insert(user.id, user);
    }

    pub fn add_role(&self, role: Role) {
        lock(&self.roles).insert(role.id, role);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(lock(&self.users).get(&id).cloned())
    }

    async fn get_role_by_id(&self, id: Uuid) -> Result<Option<Role>, AppError> {
        Ok(lock(&self.roles).get(&id).cloned())
    }
}

/// In-memory audit trail
#[derive(Clone, Default)]
pub struct InMemoryAuditLogStore {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}
