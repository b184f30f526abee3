//! Relay loop: heartbeat, connectivity re-check, fetch, execute, sleep

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};
use ue_relay_shared::health::TargetHealth;

use super::heartbeat::HeartbeatScheduler;
use crate::clock::Clock;
use crate::command::{log_health_change, CommandExecutor};
use crate::queue::{QueueClient, QueueError};
use crate::target::TargetClient;

/// Loop timing and identity
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub relay_id: String,
    pub poll_interval: Duration,
    pub batch_limit: usize,
    pub error_backoff_multiplier: u32,
    pub heartbeat_interval_ms: u64,
    pub recheck_interval_ms: u64,
}

pub struct Relay {
    settings: RelaySettings,
    queue: Arc<dyn QueueClient>,
    target: Arc<dyn TargetClient>,
    executor: CommandExecutor,
    heartbeat: HeartbeatScheduler,
    health: TargetHealth,
    clock: Clock,
}

impl Relay {
    pub fn new(
        settings: RelaySettings,
        queue: Arc<dyn QueueClient>,
        target: Arc<dyn TargetClient>,
        executor: CommandExecutor,
    ) -> Self {
        let heartbeat = HeartbeatScheduler::new(
            queue.clone(),
            settings.relay_id.clone(),
            settings.heartbeat_interval_ms,
        );
        let health = TargetHealth::new(settings.recheck_interval_ms);
        Self {
            settings,
            queue,
            target,
            executor,
            heartbeat,
            health,
            clock: Clock::start(),
        }
    }

    #[cfg(test)]
    pub fn health(&self) -> &TargetHealth {
        &self.health
    }

    /// Seed target health before the first iteration
    pub async fn startup_probe(&mut self) -> bool {
        let reachable = self.target.probe().await;
        log_health_change(
            self.health.record_probe(reachable, self.clock.now_ms()),
            self.target.endpoint(),
        );
        if !reachable {
            warn!(
                "UE5 not reachable at startup; commands fail fast until it answers (re-check every {}s)",
                self.settings.recheck_interval_ms / 1000
            );
        }
        reachable
    }

    /// One loop iteration. Returns the number of commands driven.
    ///
    /// A queue failure aborts the iteration; the caller backs off.
    pub async fn tick(&mut self, shutdown: &watch::Receiver<bool>) -> Result<usize, QueueError> {
        let now = self.clock.now_ms();
        self.heartbeat.tick(now, self.health.is_reachable()).await;

        if self.health.recheck_due(now) {
            let reachable = self.target.probe().await;
            log_health_change(
                self.health.record_probe(reachable, self.clock.now_ms()),
                self.target.endpoint(),
            );
        }

        let mut batch = self.queue.fetch_pending(self.settings.batch_limit).await?;
        if batch.is_empty() {
            return Ok(0);
        }
        // Stable, so rows without a parsable timestamp keep the store's order
        // behind the dated ones
        batch.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        info!("Fetched {} pending command(s)", batch.len());

        let mut driven = 0;
        for command in &batch {
            if *shutdown.borrow() {
                info!("Shutdown requested, leaving {} command(s) pending", batch.len() - driven);
                break;
            }
            self.executor
                .execute(command, &mut self.health, &self.clock)
                .await?;
            driven += 1;
        }
        Ok(driven)
    }

    /// Run until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Relay {} polling every {:?} (batch {})",
            self.settings.relay_id, self.settings.poll_interval, self.settings.batch_limit
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.tick(&shutdown).await {
                Ok(_) => self.settings.poll_interval,
                Err(e) => {
                    let backoff = self.settings.poll_interval * self.settings.error_backoff_multiplier;
                    error!("Relay iteration failed: {}. Retrying in {:?}", e, backoff);
                    backoff
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Relay {} stopped", self.settings.relay_id);
    }
}
