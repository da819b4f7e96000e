use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickscan_scanner::{ScanConfig, Scanner, TickClient};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let log_level = std::env::var("TICKSCAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    setup_tracing(&log_level);

    let config = ScanConfig::from_env().context("Failed to load configuration")?;
    info!("API: {}", config.api_base);
    match &config.contract_id {
        Some(id) => info!("Destination filter: {}", id),
        None => info!("Destination filter: none, scanning all destinations"),
    }
    info!("Progress file: {}", config.state_file.display());
    info!("Results file: {}", config.results_file.display());

    let client = TickClient::from_config(&config).context("Failed to create API client")?;
    let mut scanner = Scanner::new(client, &config);
    let report = scanner.run().await.context("Scan aborted")?;

    info!(
        "Inspected {} transactions, {} payout calls, {} candidate payouts, {} duplicates skipped",
        report.transactions_inspected,
        report.payout_calls,
        report.candidate_payouts,
        report.duplicates_skipped
    );
    Ok(())
}

fn setup_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
