use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FormDocument, Role, User};
use crate::constants::ACTIVITY_CREATED_DATASET;

/// Audit record published on the audit topic and persisted by the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user_name: String,
    pub user_id: String,
    pub activity: String,
    pub dataset: String,
    pub user_role: String,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Event for a dataset whose upload completed and whose form was stored.
    pub fn dataset_created(dataset: &str, form: &FormDocument, user: &User, role: &Role) -> Self {
        let mut details = BTreeMap::new();
        details.insert("form_id".to_string(), form.id.to_string());
        details.insert("form_type".to_string(), form.form_type.to_string());

        Self {
            timestamp: Utc::now(),
            user_name: user.user_name.clone(),
            user_id: user.id.to_string(),
            activity: ACTIVITY_CREATED_DATASET.to_string(),
            dataset: dataset.to_string(),
            user_role: role.name.clone(),
            details,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
