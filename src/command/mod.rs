//! Command lifecycle engine for the relay
//!
//! This module handles:
//! - Claiming fetched commands
//! - Validating and dispatching them to the target
//! - Running the capture sub-flow after successful executions
//! - Writing exactly one terminal status per claimed command

mod capture;
mod executor;

pub use capture::{CapturePipeline, CaptureSettings};
pub use executor::{log_health_change, CommandExecutor};
