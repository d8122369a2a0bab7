//! Topic names, consumer groups and pipeline defaults.

/// Public-broker topic carrying staged-file announcements.
pub const PATH_TOPIC: &str = "path";

/// Private-broker topic carrying file chunks.
pub const CHUNK_TOPIC: &str = "chunk";

/// Topic carrying audit events.
pub const AUDIT_TOPIC: &str = "audit";

pub const PATH_CONSUMER_GROUP: &str = "dataset-path-consumer-group";
pub const CHUNK_CONSUMER_GROUP: &str = "dataset-chunk-consumer-group";
pub const AUDIT_CONSUMER_GROUP: &str = "audit-logs-consumer-group";

/// Multipart field holding the uploaded file.
pub const UPLOAD_FIELD: &str = "uploadFile";

/// Activity recorded for a completed dataset upload.
pub const ACTIVITY_CREATED_DATASET: &str = "Created Dataset";

pub const DEFAULT_STAGING_DIR: &str = "./uploads";
pub const DEFAULT_DATASET_DIR: &str = "./datasets";

/// 20 GiB.
pub const DEFAULT_MAX_UPLOAD_SIZE_MB: u64 = 20 * 1024;
