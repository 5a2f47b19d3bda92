use anyhow::Result;
use clap::Parser;

use card_health::cli::{self, Cli};
use card_health::config::AppConfig;
use card_health::monitoring::logger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, secrets) = AppConfig::load()?;

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        database = %config.database.path,
        failure_mode = ?config.recommendations.failure_mode,
        "Card health starting"
    );

    let response = cli::run(cli, &config, secrets).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
