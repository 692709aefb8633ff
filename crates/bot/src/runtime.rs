use std::time::Duration;

use anyhow::Result;
use tradebot_core::config::{AppConfig, LoadOptions};

use crate::bootstrap;
use crate::events::EventPump;

pub fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use tradebot_core::config::LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub async fn run(options: LoadOptions) -> Result<()> {
    // Logging comes up before bootstrap so restore problems are visible.
    let config = AppConfig::load(options)?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let pump = EventPump::new(app.trades.clone(), Duration::from_secs(app.config.trading.poll_interval_secs));

    tracing::info!(
        event_name = "system.bot.started",
        steam_id = %app.steam_id,
        poll_interval_secs = app.config.trading.poll_interval_secs,
        "tradebot started"
    );
    let _sender = app.event_sender;
    pump.run(app.events, wait_for_shutdown()).await;
    tracing::info!(event_name = "system.bot.stopping", "tradebot stopping");

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %signal_error, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
