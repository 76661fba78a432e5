use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use transiter_loadtest::{report, Config, Driver, Fetcher, HttpFetcher};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    // Print banner
    info!("════════════════════════════════════════════════════════════");
    info!("           TRANSITER LOAD TEST");
    info!("════════════════════════════════════════════════════════════");
    info!("Target: {}", config.base_url);
    info!("Duration: {}s", config.duration_secs);
    info!("Max Concurrency: {}", config.max_concurrency);
    info!(
        "Spawn Delay: {}-{}ms",
        config.min_spawn_delay_ms, config.max_spawn_delay_ms
    );
    info!(
        "Action Pause: {}-{}ms",
        config.min_action_pause_ms, config.max_action_pause_ms
    );
    info!("Seed: {}", config.seed);
    info!("════════════════════════════════════════════════════════════");

    let fetcher: Arc<dyn Fetcher> = Arc::new(
        HttpFetcher::new(config.request_timeout()).context("Failed to create HTTP client")?,
    );
    info!("Using fetcher: {}", fetcher.name());

    let summary = Driver::new(Arc::clone(&config), fetcher).run().await?;

    report::print_summary(&summary);
    if let Some(path) = &config.output {
        report::write_json(&summary, path)?;
    }

    info!("════════════════════════════════════════════════════════════");
    info!("                 LOAD TEST COMPLETE");
    info!("════════════════════════════════════════════════════════════");

    Ok(())
}
