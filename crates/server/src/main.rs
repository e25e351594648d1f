mod bootstrap;
mod controller;

use std::time::Duration;

use anyhow::Result;
use garagebot_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use garagebot_core::config::LogFormat::*;
    use tracing::Level;

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

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let bootstrap::Application { config, sensor, message_loop } = app;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poll_interval = Duration::from_millis(config.hardware.poll_interval_ms);
    let sensor_task = tokio::spawn(sensor.run(poll_interval, shutdown_rx));

    message_loop.start().await?;

    tracing::info!(
        driver = ?config.hardware.driver,
        poll_interval_ms = config.hardware.poll_interval_ms,
        "garagebot-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!("garagebot-server stopping");

    let _ = shutdown_tx.send(true);
    sensor_task.await?;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
