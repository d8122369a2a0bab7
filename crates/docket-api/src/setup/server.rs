//! Server startup and graceful shutdown

use anyhow::Result;
use axum::Router;
use docket_core::GatewayConfig;
use tokio_util::sync::CancellationToken;

/// Serves `app` until `cancel` fires, then drains in-flight requests.
pub async fn start_server(config: &GatewayConfig, app: Router, cancel: CancellationToken) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        prefix = %config.route_prefix(),
        max_upload_mb = config.max_upload_size_bytes / 1024 / 1024,
        environment = %config.environment,
        "Server ready and accepting connections"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
