//! Session manager bot entry point.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use session_manager_bot::config::{BotSettings, TelegramConfig};
use session_manager_bot::telegram;

#[derive(Parser, Debug)]
#[command(name = "session_manager_bot")]
#[command(about = "Telegram bot that generates and manages account session strings")]
#[command(version)]
struct Args {
    /// Path to the environment file with credentials.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("session_manager_bot={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load env file {}: {}", args.env_file, e);
    }

    let config = TelegramConfig::from_env()
        .context("Failed to load Telegram credentials from environment")?;
    let settings = BotSettings::from_env_with_defaults();

    info!(
        "Starting session manager bot (auto-delete after {}s)",
        settings.auto_delete_delay_secs
    );

    tokio::select! {
        result = telegram::run_bot(&config, &settings) => {
            result.context("Bot stopped with an error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
