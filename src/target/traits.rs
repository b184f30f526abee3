//! Target client abstraction for the controllable endpoint

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::artifact::StoreError;

/// Why a command could not be executed on the target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The target did not answer at all
    #[error("Not connected to UE5 at {endpoint}: {reason}")]
    NotConnected { endpoint: String, reason: String },

    /// The target answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request failed in flight (timeout, reset, bad response)
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Why the capture sub-flow produced no locator. Never fails a command.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture trigger failed: {0}")]
    Trigger(#[from] ExecutionError),

    #[error("No capture found at {expected} or in {directory}")]
    Missing { expected: PathBuf, directory: PathBuf },

    #[error("Failed to read capture {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture upload failed: {0}")]
    Upload(#[from] StoreError),
}

/// Operations the relay needs from the controllable target
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Short reachability check without side effects
    async fn probe(&self) -> bool;

    /// Run an opaque command and return the target's response body
    async fn execute(&self, code: &str) -> Result<String, ExecutionError>;

    /// Ask the target to write a capture to `destination`. Returns the
    /// expected location; the file may appear some time later.
    async fn trigger_capture(&self, destination: &Path) -> Result<PathBuf, CaptureError>;

    /// Human-readable address of the target, for messages
    fn endpoint(&self) -> &str;
}
