use anyhow::Context;
use tracing::{error, info};

use mail_retag::config::RetagConfig;
use mail_retag::pipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RetagConfig::from_env().context("Failed to load configuration")?;

    match pipeline::run(&config).await {
        Ok(summary) => {
            info!(
                selected = summary.selected,
                classified = summary.classified,
                skipped = summary.skipped,
                mutated = summary.mutated,
                normalized = summary.normalized_total(),
                "Run complete"
            );
            info!("Ok");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Retag run failed");
            std::process::exit(1);
        }
    }
}
