use docket_core::WorkerConfig;
use docket_infra::telemetry::json_from_env;
use docket_infra::{cancel_on_shutdown, init_telemetry};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = WorkerConfig::from_env()?;
    init_telemetry("docket-worker", json_from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
    config.validate()?;

    let cancel = cancel_on_shutdown();
    docket_worker::run(config, cancel).await?;
    Ok(())
}
