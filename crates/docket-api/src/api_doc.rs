//! OpenAPI documentation.
//!
//! Handler annotations use the default `/api/v1/extkafka` prefix because utoipa needs
//! literals; [`openapi_for_prefix`] rewrites them to the configured prefix.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;

const OPENAPI_PATH_PLACEHOLDER: &str = "/api/v1/extkafka";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Docket Ingest Gateway",
        version = "0.1.0",
        description = "Stages dataset uploads and hands them to the storage-side ingestion pipeline."
    ),
    paths(handlers::upload::upload_dataset, handlers::health::liveness),
    components(schemas(handlers::upload::UploadResponse, ErrorResponse)),
    tags(
        (name = "uploads", description = "Dataset uploads"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// The OpenAPI document with paths moved under `prefix`.
pub fn openapi_for_prefix(prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    if prefix != OPENAPI_PATH_PLACEHOLDER {
        let paths = std::mem::take(&mut doc.paths.paths);
        for (key, item) in paths {
            let new_key = key.replacen(OPENAPI_PATH_PLACEHOLDER, prefix, 1);
            doc.paths.paths.insert(new_key, item);
        }
    }
    doc
}
