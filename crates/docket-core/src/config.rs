//! Configuration module
//!
//! Environment-driven configuration for the ingest gateway and the storage-side worker.
//! Both load `.env` first, fall back to defaults for anything unset or unparsable, and
//! are checked with `validate()` before the process starts serving.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::broker_types::BrokerBackend;
use crate::constants::{
    AUDIT_CONSUMER_GROUP, AUDIT_TOPIC, CHUNK_CONSUMER_GROUP, CHUNK_TOPIC, DEFAULT_DATASET_DIR,
    DEFAULT_MAX_UPLOAD_SIZE_MB, DEFAULT_STAGING_DIR, PATH_CONSUMER_GROUP, PATH_TOPIC,
};

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const HTTP_TIMEOUT_SECS: u64 = 3600;
const JANITOR_INTERVAL_SECS: u64 = 600;
const ASSEMBLER_STALE_AFTER_SECS: u64 = 1800;
const BROKER_POLL_TIMEOUT_SECS: u64 = 5;
const BROKER_RETRY_BACKOFF_MS: u64 = 1000;

/// Which broker backend to use and where the public and private clusters live.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub backend: BrokerBackend,
    /// `KAFKA_BROKER_ADDRESS`, carries the `path` topic.
    pub public_address: Option<String>,
    /// `KAFKA_INT_BROKER_ADDRESS`, carries the `chunk` and `audit` topics.
    pub private_address: Option<String>,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let backend = match env::var("BROKER_BACKEND") {
            Ok(value) if !value.trim().is_empty() => value.parse::<BrokerBackend>()?,
            _ => BrokerBackend::Kafka,
        };

        Ok(Self {
            backend,
            public_address: non_empty_var("KAFKA_BROKER_ADDRESS"),
            private_address: non_empty_var("KAFKA_INT_BROKER_ADDRESS"),
        })
    }

    /// In-process configuration used by tests and single-binary demos.
    pub fn memory() -> Self {
        Self {
            backend: BrokerBackend::Memory,
            public_address: None,
            private_address: None,
        }
    }

    /// The in-memory backend only connects tasks inside one process and never drops
    /// records, so it is refused anywhere but in tests.
    fn validate_backend(&self, environment: &str) -> Result<(), anyhow::Error> {
        if self.backend == BrokerBackend::Memory && !environment.eq_ignore_ascii_case("test") {
            return Err(anyhow::anyhow!(
                "BROKER_BACKEND=memory is only allowed with ENVIRONMENT=test"
            ));
        }
        Ok(())
    }

    fn validate_public(&self) -> Result<(), anyhow::Error> {
        if self.backend == BrokerBackend::Kafka && self.public_address.is_none() {
            return Err(anyhow::anyhow!(
                "KAFKA_BROKER_ADDRESS must be set when BROKER_BACKEND=kafka"
            ));
        }
        Ok(())
    }

    fn validate_private(&self) -> Result<(), anyhow::Error> {
        if self.backend == BrokerBackend::Kafka && self.private_address.is_none() {
            return Err(anyhow::anyhow!(
                "KAFKA_INT_BROKER_ADDRESS must be set when BROKER_BACKEND=kafka"
            ));
        }
        Ok(())
    }
}

/// Ingest gateway configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub server_port: u16,
    pub environment: String,
    pub api_base_path: String,
    pub api_version: String,
    pub staging_dir: PathBuf,
    pub max_upload_size_bytes: u64,
    pub http_timeout_secs: u64,
    pub path_topic: String,
    pub broker: BrokerConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let max_upload_size_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(DEFAULT_MAX_UPLOAD_SIZE_MB);

        Ok(Self {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment: environment(),
            api_base_path: env::var("API_BASE_PATH").unwrap_or_else(|_| "/api".to_string()),
            api_version: env::var("API_VERSION").unwrap_or_else(|_| "v1".to_string()),
            staging_dir: PathBuf::from(
                env::var("UPLOAD_STAGING_DIR").unwrap_or_else(|_| DEFAULT_STAGING_DIR.to_string()),
            ),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| HTTP_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(HTTP_TIMEOUT_SECS),
            path_topic: env::var("PATH_TOPIC").unwrap_or_else(|_| PATH_TOPIC.to_string()),
            broker: BrokerConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }
        if !self.api_base_path.is_empty() && !self.api_base_path.starts_with('/') {
            return Err(anyhow::anyhow!("API_BASE_PATH must start with '/'"));
        }
        if self.api_version.trim().is_empty() {
            return Err(anyhow::anyhow!("API_VERSION must not be empty"));
        }
        self.broker.validate_backend(&self.environment)?;
        self.broker.validate_public()
    }

    pub fn is_production(&self) -> bool {
        is_production(&self.environment)
    }

    /// `{base}/{version}/extkafka`, the prefix every gateway route hangs off.
    pub fn route_prefix(&self) -> String {
        format!(
            "{}/{}/extkafka",
            self.api_base_path.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Storage-side worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub environment: String,
    pub broker: BrokerConfig,
    pub path_topic: String,
    pub chunk_topic: String,
    pub audit_topic: String,
    pub path_consumer_group: String,
    pub chunk_consumer_group: String,
    pub audit_consumer_group: String,
    pub dataset_default_dir: PathBuf,
    pub dataset_destination_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub janitor_interval_secs: u64,
    pub assembler_stale_after_secs: u64,
    pub assembler_completed_retention_secs: Option<u64>,
    pub broker_poll_timeout_secs: u64,
    pub broker_retry_backoff_ms: u64,
    pub audit_sink_enabled: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url = non_empty_var("DATABASE_URL");
        let audit_sink_enabled = env::var("AUDIT_SINK_ENABLED")
            .ok()
            .and_then(|s| s.to_lowercase().parse().ok())
            .unwrap_or(database_url.is_some());

        Ok(Self {
            environment: environment(),
            broker: BrokerConfig::from_env()?,
            path_topic: env::var("PATH_TOPIC").unwrap_or_else(|_| PATH_TOPIC.to_string()),
            chunk_topic: env::var("CHUNK_TOPIC").unwrap_or_else(|_| CHUNK_TOPIC.to_string()),
            audit_topic: env::var("AUDIT_TOPIC").unwrap_or_else(|_| AUDIT_TOPIC.to_string()),
            path_consumer_group: env::var("PATH_CONSUMER_GROUP")
                .unwrap_or_else(|_| PATH_CONSUMER_GROUP.to_string()),
            chunk_consumer_group: env::var("CHUNK_CONSUMER_GROUP")
                .unwrap_or_else(|_| CHUNK_CONSUMER_GROUP.to_string()),
            audit_consumer_group: env::var("AUDIT_CONSUMER_GROUP")
                .unwrap_or_else(|_| AUDIT_CONSUMER_GROUP.to_string()),
            dataset_default_dir: PathBuf::from(
                env::var("DATASET_DEFAULT_DIR").unwrap_or_else(|_| DEFAULT_DATASET_DIR.to_string()),
            ),
            dataset_destination_dir: non_empty_var("DATASET_DESTINATION_DIR").map(PathBuf::from),
            database_url,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            janitor_interval_secs: env::var("JANITOR_INTERVAL_SECS")
                .unwrap_or_else(|_| JANITOR_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(JANITOR_INTERVAL_SECS),
            assembler_stale_after_secs: env::var("ASSEMBLER_STALE_AFTER_SECS")
                .unwrap_or_else(|_| ASSEMBLER_STALE_AFTER_SECS.to_string())
                .parse()
                .unwrap_or(ASSEMBLER_STALE_AFTER_SECS),
            assembler_completed_retention_secs: env::var("ASSEMBLER_COMPLETED_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            broker_poll_timeout_secs: env::var("BROKER_POLL_TIMEOUT_SECS")
                .unwrap_or_else(|_| BROKER_POLL_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(BROKER_POLL_TIMEOUT_SECS),
            broker_retry_backoff_ms: env::var("BROKER_RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| BROKER_RETRY_BACKOFF_MS.to_string())
                .parse()
                .unwrap_or(BROKER_RETRY_BACKOFF_MS),
            audit_sink_enabled,
        })
    }

    /// Defaults with the in-memory broker and no database, rooted at `dataset_default_dir`.
    pub fn in_memory(dataset_default_dir: impl Into<PathBuf>) -> Self {
        Self {
            environment: "test".to_string(),
            broker: BrokerConfig::memory(),
            path_topic: PATH_TOPIC.to_string(),
            chunk_topic: CHUNK_TOPIC.to_string(),
            audit_topic: AUDIT_TOPIC.to_string(),
            path_consumer_group: PATH_CONSUMER_GROUP.to_string(),
            chunk_consumer_group: CHUNK_CONSUMER_GROUP.to_string(),
            audit_consumer_group: AUDIT_CONSUMER_GROUP.to_string(),
            dataset_default_dir: dataset_default_dir.into(),
            dataset_destination_dir: None,
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            janitor_interval_secs: JANITOR_INTERVAL_SECS,
            assembler_stale_after_secs: ASSEMBLER_STALE_AFTER_SECS,
            assembler_completed_retention_secs: None,
            broker_poll_timeout_secs: BROKER_POLL_TIMEOUT_SECS,
            broker_retry_backoff_ms: BROKER_RETRY_BACKOFF_MS,
            audit_sink_enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }
        if self.audit_sink_enabled && self.database_url.is_none() {
            return Err(anyhow::anyhow!(
                "AUDIT_SINK_ENABLED=true requires DATABASE_URL to be set"
            ));
        }
        if self.janitor_interval_secs == 0 {
            return Err(anyhow::anyhow!("JANITOR_INTERVAL_SECS must be greater than 0"));
        }
        if self.broker_poll_timeout_secs == 0 {
            return Err(anyhow::anyhow!("BROKER_POLL_TIMEOUT_SECS must be greater than 0"));
        }
        self.broker.validate_backend(&self.environment)?;
        self.broker.validate_public()?;
        self.broker.validate_private()
    }

    pub fn is_production(&self) -> bool {
        is_production(&self.environment)
    }

    /// Directory reassembled uploads are written to: `DATASET_DESTINATION_DIR`, else
    /// `DATASET_DEFAULT_DIR`. Never the staging directory itself.
    pub fn destination_dir(&self) -> &Path {
        self.dataset_destination_dir
            .as_deref()
            .unwrap_or(&self.dataset_default_dir)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    pub fn assembler_stale_after(&self) -> Duration {
        Duration::from_secs(self.assembler_stale_after_secs)
    }

    pub fn assembler_completed_retention(&self) -> Option<Duration> {
        self.assembler_completed_retention_secs
            .map(Duration::from_secs)
    }

    pub fn broker_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_poll_timeout_secs)
    }

    pub fn broker_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.broker_retry_backoff_ms)
    }
}

fn environment() -> String {
    env::var("ENVIRONMENT")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn is_production(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> GatewayConfig {
        GatewayConfig {
            server_port: 8080,
            environment: "development".to_string(),
            api_base_path: "/api".to_string(),
            api_version: "v1".to_string(),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            max_upload_size_bytes: DEFAULT_MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            path_topic: PATH_TOPIC.to_string(),
            broker: BrokerConfig::memory(),
        }
    }

    #[test]
    fn route_prefix_joins_base_and_version() {
        let mut config = gateway();
        assert_eq!(config.route_prefix(), "/api/v1/extkafka");

        config.api_base_path = "/platform/".to_string();
        config.api_version = "/v2/".to_string();
        assert_eq!(config.route_prefix(), "/platform/v2/extkafka");
    }

    #[test]
    fn default_upload_limit_is_twenty_gib() {
        assert_eq!(gateway().max_upload_size_bytes, 20 * 1024 * 1024 * 1024);
    }

    #[test]
    fn kafka_backend_requires_addresses() {
        let mut config = gateway();
        config.broker.backend = BrokerBackend::Kafka;
        assert!(config.validate().is_err());

        config.broker.public_address = Some("localhost:9092".to_string());
        assert!(config.validate().is_ok());

        let mut worker = WorkerConfig::in_memory("/tmp/datasets");
        worker.broker = config.broker.clone();
        assert!(worker.validate().is_err());
        worker.broker.private_address = Some("localhost:9093".to_string());
        assert!(worker.validate().is_ok());
    }

    #[test]
    fn audit_sink_needs_a_database() {
        let mut worker = WorkerConfig::in_memory("/tmp/datasets");
        worker.audit_sink_enabled = true;
        assert!(worker.validate().is_err());

        worker.database_url = Some("postgresql://localhost/docket".to_string());
        assert!(worker.validate().is_ok());

        worker.database_url = Some("mysql://localhost/docket".to_string());
        assert!(worker.validate().is_err());
    }

    #[test]
    fn memory_backend_is_refused_outside_tests() {
        let mut config = gateway();
        assert!(config.validate().is_err());
        config.environment = "test".to_string();
        assert!(config.validate().is_ok());

        let mut worker = WorkerConfig::in_memory("/tmp/datasets");
        assert!(worker.validate().is_ok());
        worker.environment = "production".to_string();
        assert!(worker.validate().is_err());
    }

    #[test]
    fn destination_falls_back_to_default_dir() {
        let mut worker = WorkerConfig::in_memory("/srv/datasets");
        assert_eq!(worker.destination_dir(), Path::new("/srv/datasets"));

        worker.dataset_destination_dir = Some(PathBuf::from("/srv/final"));
        assert_eq!(worker.destination_dir(), Path::new("/srv/final"));
    }

    #[test]
    fn in_memory_worker_uses_documented_defaults() {
        let worker = WorkerConfig::in_memory("/tmp/datasets");
        assert_eq!(worker.janitor_interval(), Duration::from_secs(600));
        assert_eq!(worker.assembler_stale_after(), Duration::from_secs(1800));
        assert_eq!(worker.broker_poll_timeout(), Duration::from_secs(5));
        assert_eq!(worker.broker_retry_backoff(), Duration::from_millis(1000));
        assert!(worker.assembler_completed_retention().is_none());
        assert_eq!(worker.chunk_consumer_group, "dataset-chunk-consumer-group");
    }
}
