use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tenderbridge_core::config::{AppConfig, LoadOptions};
use tenderbridge_server::bootstrap::bootstrap_with_config;
use tenderbridge_server::health;
use tenderbridge_server::services::{self, AwardWorkerTask, ScheduledTransitionTask};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use tenderbridge_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before anything else can log.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let mut handles = vec![services::start(
        Arc::new(AwardWorkerTask::new(app.worker.clone())),
        Duration::from_millis(app.config.worker.poll_interval_ms),
    )];
    if app.config.scheduler.enabled {
        handles.push(services::start(
            Arc::new(ScheduledTransitionTask::new(app.lifecycle.clone())),
            Duration::from_secs(app.config.scheduler.sweep_interval_secs),
        ));
    }

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        worker_id = %app.config.worker.worker_id,
        ledger_mode = app.config.ledger.mode.as_str(),
        services = handles.len(),
        "tenderbridge-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tenderbridge-server stopping"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    for handle in handles {
        handle.stop(grace).await;
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
