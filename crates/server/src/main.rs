mod bootstrap;
mod health;
mod orders;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use roomservice_core::config::{AppConfig, LoadOptions};
use roomservice_transport::NoopTransport;
use tracing_subscriber::EnvFilter;

const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging(config: &AppConfig) {
    use roomservice_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config, Arc::new(NoopTransport)).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HttpState {
            db_pool: app.db_pool.clone(),
            sessions: app.sessions.clone(),
            pairing: app.pairing.clone(),
            order_status: app.order_status.clone(),
        },
    )
    .await?;

    tracing::info!(
        event_name = "system.server.transport_mode",
        correlation_id = "bootstrap",
        transport_mode = "noop",
        "messaging transport initialized"
    );

    app.activate_tenants().await;
    let sweep = app.spawn_idle_sweep(IDLE_SWEEP_INTERVAL);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        tenants = app.config.tenants.len(),
        "roomservice-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "roomservice-server stopping"
    );

    sweep.abort();
    app.shutdown().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
