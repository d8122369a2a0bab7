use async_trait::async_trait;
use chrono::Utc;
use docket_core::models::{NewSampleDataset, SampleDatasetRow, UploadId};
use docket_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::traits::SampleDatasetStore;

/// Repository for the sample-dataset index
#[derive(Clone)]
pub struct SampleDatasetRepository {
    pool: PgPool,
}

impl SampleDatasetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SampleDatasetStore for SampleDatasetRepository {
    async fn create_sample_dataset(
        &self,
        dataset: NewSampleDataset,
    ) -> Result<SampleDatasetRow, AppError> {
        let row = sqlx::query_as::<_, SampleDatasetRow>(
            r#"
            INSERT INTO sample_datasets (id, name, internal_uuid, external_uuid, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, internal_uuid, external_uuid, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&dataset.name)
        .bind(dataset.internal_uuid)
        .bind(dataset.external_uuid)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_by_internal_uuid(
        &self,
        internal_uuid: UploadId,
    ) -> Result<Vec<SampleDatasetRow>, AppError> {
        let rows = sqlx::query_as::<_, SampleDatasetRow>(
            r#"
            SELECT id, name, internal_uuid, external_uuid, created_at
            FROM sample_datasets
            WHERE internal_uuid = $1
            ORDER BY created_at
            "#,
        )
        .bind(internal_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
