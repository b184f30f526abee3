mod artifact;
mod clock;
mod command;
mod config;
mod queue;
mod relay;
mod target;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use artifact::SupabaseStorage;
use clap::Parser;
use command::{CapturePipeline, CommandExecutor};
use config::{parse_base_url, RelayConfig};
use queue::{QueueTables, SupabaseEndpoint, SupabaseQueue};
use relay::Relay;
use std::sync::Arc;
use std::time::Duration;
use target::{RemoteControlClient, RemoteControlConfig};
use tokio::sync::watch;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = RelayConfig::parse();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        return Err(e);
    }

    info!("UE5 relay starting: {}", config.relay_id);
    info!("  Queue: {}", config.supabase_url);
    info!("  UE5 Remote Control: {}", config.target_url);
    info!("  Capture dir: {} (policy {:?})", config.capture_dir.display(), config.capture_policy);

    let endpoint = SupabaseEndpoint::new(&parse_base_url(&config.supabase_url)?, &config.supabase_key);
    let tables = QueueTables {
        commands: config.commands_table.clone(),
        heartbeat: config.heartbeat_table.clone(),
        events: config.events_table.clone(),
        timeline: config.timeline_table.clone(),
    };
    let queue = Arc::new(
        SupabaseQueue::new(endpoint.clone(), tables).context("failed to build queue client")?,
    );
    let storage = Arc::new(
        SupabaseStorage::new(endpoint, &config.storage_bucket)
            .context("failed to build storage client")?,
    );
    let target = Arc::new(
        RemoteControlClient::new(
            &parse_base_url(&config.target_url)?,
            RemoteControlConfig {
                probe_timeout: Duration::from_millis(config.probe_timeout_ms),
                execute_timeout: Duration::from_millis(config.execute_timeout_ms),
            },
        )
        .context("failed to build UE5 client")?,
    );

    let capture = CapturePipeline::new(
        target.clone(),
        storage,
        queue.clone(),
        config.capture_settings(),
        &config.agent_name,
    );
    let executor = CommandExecutor::new(
        queue.clone(),
        target.clone(),
        capture,
        config.capture_policy,
        &config.agent_name,
    );

    let mut relay = Relay::new(config.relay_settings(), queue, target, executor);
    relay.startup_probe().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current command");
            let _ = shutdown_tx.send(true);
        }
    });

    relay.run(shutdown_rx).await;
    info!("UE5 relay shut down");
    Ok(())
}
