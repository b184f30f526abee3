//! Relay loop and periodic work
//!
//! This module handles:
//! - Polling the queue and driving fetched commands in order
//! - Heartbeat upserts on their own cadence
//! - Connectivity re-checks while the target is down
//! - Backoff after queue failures and cooperative shutdown

mod heartbeat;
mod runner;

pub use runner::{Relay, RelaySettings};
