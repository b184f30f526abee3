//! Liveness record scheduling

use std::sync::Arc;
use tracing::{debug, warn};
use ue_relay_shared::health::Cadence;
use ue_relay_shared::HeartbeatRecord;

use crate::queue::QueueClient;

const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upserts the heartbeat row on its own cadence inside the relay loop
pub struct HeartbeatScheduler {
    queue: Arc<dyn QueueClient>,
    relay_id: String,
    cadence: Cadence,
}

impl HeartbeatScheduler {
    pub fn new(queue: Arc<dyn QueueClient>, relay_id: impl Into<String>, interval_ms: u64) -> Self {
        Self {
            queue,
            relay_id: relay_id.into(),
            cadence: Cadence::new(interval_ms),
        }
    }

    /// Send a heartbeat if one is due. Returns true when the write landed.
    pub async fn tick(&mut self, now_ms: u64, target_connected: bool) -> bool {
        if !self.cadence.tick(now_ms) {
            return false;
        }

        let record = HeartbeatRecord::new(&self.relay_id, target_connected, RELAY_VERSION);
        match self.queue.upsert_heartbeat(&record).await {
            Ok(()) => {
                debug!("Heartbeat sent (ue5_connected={})", target_connected);
                true
            }
            Err(e) => {
                warn!("Heartbeat failed: {}", e);
                false
            }
        }
    }
}
