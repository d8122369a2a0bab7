use async_trait::async_trait;
use docket_core::models::AuditEvent;
use docket_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::traits::AuditLogStore;

#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for AuditLogRepository {
    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        let details = serde_json::to_value(&event.details)?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, occurred_at, user_name, user_id, activity, dataset, user_role, details
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.timestamp)
        .bind(&event.user_name)
        .bind(&event.user_id)
        .bind(&event.activity)
        .bind(&event.dataset)
        .bind(&event.user_role)
        .bind(details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
