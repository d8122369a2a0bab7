//! Pool creation and schema migrations

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use docket_core::WorkerConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connects to `DATABASE_URL` and applies pending migrations.
///
/// Returns `Ok(None)` when no database is configured; the caller then runs without
/// collaborator stores.
pub async fn connect_and_migrate(config: &WorkerConfig) -> Result<Option<PgPool>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, running without form and dataset stores");
        return Ok(None);
    };

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
