use paylink_service::{config::Config, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    init_tracing(
        &config.service.name,
        &config.logging.severity,
        config.logging.otlp_endpoint.as_deref(),
        config.logging.json,
    );

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        e
    })?;
    application.run_until_stopped().await?;

    Ok(())
}
