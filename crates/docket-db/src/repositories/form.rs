use async_trait::async_trait;
use docket_core::models::{FormData, FormDocument};
use docket_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::traits::FormStore;

/// Repository for form documents
#[derive(Clone)]
pub struct FormRepository {
    pool: PgPool,
}

impl FormRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FormStore for FormRepository {
    #[tracing::instrument(skip(self, form), fields(form_type = %form.form_type))]
    async fn create_form(&self, form: &FormData) -> Result<FormDocument, AppError> {
        let document = FormDocument::from_form_data(form);

        let stored = sqlx::query_as::<_, FormDocument>(
            r#"
            INSERT INTO forms (id, form_type, data, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, form_type, data, created_at
            "#,
        )
        .bind(document.id)
        .bind(document.form_type)
        .bind(&document.data)
        .bind(document.created_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(form_id = %stored.id, "Form document created");
        Ok(stored)
    }

    async fn get_form_by_id(&self, id: Uuid) -> Result<Option<FormDocument>, AppError> {
        let row = sqlx::query_as::<_, FormDocument>(
            r#"
            SELECT id, form_type, data, created_at
            FROM forms
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
