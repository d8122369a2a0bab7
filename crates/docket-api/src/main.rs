use docket_core::GatewayConfig;
use docket_infra::telemetry::json_from_env;
use docket_infra::{cancel_on_shutdown, init_telemetry};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = GatewayConfig::from_env()?;
    init_telemetry("docket-api", json_from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    config.validate()?;

    let (_state, router) = docket_api::initialize_app(config.clone()).await?;

    let cancel = cancel_on_shutdown();
    docket_api::setup::server::start_server(&config, router, cancel).await?;
    Ok(())
}
