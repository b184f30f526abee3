//! Queue client abstraction for pluggable store backends

use async_trait::async_trait;
use thiserror::Error;
use ue_relay_shared::codec::CodecError;
use ue_relay_shared::{Command, EventLogEntry, HeartbeatRecord, TerminalUpdate, TimelineEntry};

/// Any queue store failure. Always transient from the relay's point of view:
/// the loop backs off and retries, nothing retries locally.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Queue returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Queue response could not be decoded: {0}")]
    Decode(#[from] CodecError),

    #[error("Invalid queue URL: {0}")]
    InvalidUrl(String),
}

/// Result of trying to claim a pending row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This relay moved the row from pending to executing
    Claimed,
    /// The row was no longer pending; someone else owns it
    AlreadyTaken,
}

/// Operations the relay needs from the queue store
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Pending rows, oldest first, at most `limit` of them
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Command>, QueueError>;

    /// Conditionally move a row from pending to executing
    async fn mark_executing(&self, id: &str) -> Result<ClaimOutcome, QueueError>;

    /// Write the terminal status and stamp `executed_at`. A row already
    /// terminal is left untouched, so repeating the call is a no-op.
    async fn mark_terminal(&self, id: &str, update: &TerminalUpdate) -> Result<(), QueueError>;

    /// Overwrite this relay's liveness row
    async fn upsert_heartbeat(&self, record: &HeartbeatRecord) -> Result<(), QueueError>;

    /// Append an observability entry
    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), QueueError>;

    /// Append a conversational timeline entry
    async fn append_timeline(&self, entry: &TimelineEntry) -> Result<(), QueueError>;
}
