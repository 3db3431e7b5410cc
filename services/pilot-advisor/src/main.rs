use pilot_advisor::AdvisorService;
use pilot_common::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started = std::time::Instant::now();

    let config = Config::load_and_validate()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.bind_address(),
        agents_endpoint = %config.agents.endpoint,
        scheduler_enabled = config.schedule.enabled,
        startup_ms = started.elapsed().as_millis() as u64,
        "Starting pilot-advisor"
    );

    AdvisorService::start(config).await
}
