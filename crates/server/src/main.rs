mod bootstrap;
mod calendar;
mod handler;
mod health;
mod http;
mod llm;
mod sheets;
mod webhook;

use std::time::Duration;

use anyhow::Result;
use citabot_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use citabot_core::config::LogFormat::*;
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
    // Logging must be live before bootstrap reports on collaborators.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(&app.config.server.bind_address, app.config.server.health_check_port, app.health_state())
        .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let webhook_server = webhook::spawn(
        &app.config.server.bind_address,
        app.config.transport.webhook_port,
        app.webhook.clone(),
        shutdown_rx,
    )
    .await?;

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let runner = app.runner;
    drop(app.webhook);
    let transport_task = tokio::spawn(async move { runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        business = %app.profiles.snapshot().name,
        "citabot-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "citabot-server stopping; draining in-flight conversations"
    );

    let _ = shutdown_tx.send(true);
    let drained = tokio::time::timeout(grace, async {
        let _ = webhook_server.await;
        transport_task.await
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight conversations did not finish within the grace period"
        );
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
