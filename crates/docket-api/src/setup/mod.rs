//! Application setup: broker client, staging directory and router.

pub mod server;

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Json, Router};
use docket_broker::create_broker;
use docket_core::GatewayConfig;
use docket_infra::request_id_middleware;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api_doc::openapi_for_prefix;
use crate::handlers;
use crate::state::AppState;

/// Room for the multipart framing and text fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Connects the public broker, prepares the staging directory and builds the router.
pub async fn initialize_app(config: GatewayConfig) -> anyhow::Result<(Arc<AppState>, Router)> {
    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                config.staging_dir.display()
            )
        })?;

    let broker = create_broker(config.broker.backend, config.broker.public_address.as_deref())
        .context("Failed to create broker client")?;

    tracing::info!(
        backend = %config.broker.backend,
        staging_dir = %config.staging_dir.display(),
        topic = %config.path_topic,
        "Gateway initialized"
    );

    let state = Arc::new(AppState::new(config, broker));
    let router = build_router(state.clone());
    Ok((state, router))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let prefix = state.config.route_prefix();
    let body_limit = usize::try_from(
        state
            .config
            .max_upload_size_bytes
            .saturating_add(MULTIPART_OVERHEAD_BYTES),
    )
    .unwrap_or(usize::MAX);
    let timeout = state.config.http_timeout();
    let openapi = openapi_for_prefix(&prefix);

    Router::new()
        .route(
            &format!("{}/upload", prefix),
            post(handlers::upload::upload_dataset),
        )
        .route(&format!("{}/test", prefix), get(handlers::health::liveness))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { Json(openapi) }),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
}
