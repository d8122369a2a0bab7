use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::UploadId;

/// Index row linking an upload to the form document created for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SampleDatasetRow {
    pub id: Uuid,
    pub name: String,
    pub internal_uuid: UploadId,
    pub external_uuid: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSampleDataset {
    pub name: String,
    pub internal_uuid: UploadId,
    pub external_uuid: Uuid,
}
