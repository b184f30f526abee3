//! UE5 Relay Shared Types
//!
//! This crate provides the canonical command model, the row codec and the
//! lifecycle state machine shared by the relay binary. It performs no I/O.

pub mod codec;
pub mod health;
pub mod model;
pub mod state_machine;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// Re-export commonly used types at crate root
pub use model::*;

/// Get the current wall-clock time in UTC
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Format a timestamp the way the queue store expects it (RFC 3339)
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Timing parameters for the relay
pub mod relay {
    /// Sleep between two queue polls
    pub const POLL_INTERVAL_MS: u64 = 1000;

    /// Maximum rows fetched per poll, keeps heartbeat and re-checks flowing
    pub const BATCH_LIMIT: usize = 10;

    /// Poll interval multiplier applied after a failed iteration
    pub const ERROR_BACKOFF_MULTIPLIER: u32 = 5;

    /// Liveness record cadence. Observers treat a relay as offline after 30s.
    pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

    /// How long a failed probe is trusted before the target is probed again
    pub const CONNECTIVITY_RECHECK_MS: u64 = 15_000;

    /// Probe request timeout
    pub const PROBE_TIMEOUT_MS: u64 = 3_000;

    /// Command execution request timeout
    pub const EXECUTE_TIMEOUT_MS: u64 = 30_000;

    /// Rendering delay before the capture output is looked at
    pub const CAPTURE_SETTLE_MS: u64 = 2_000;

    /// Upper bound on waiting for the capture file to finish writing
    pub const CAPTURE_WRITE_TIMEOUT_MS: u64 = 10_000;

    /// Interval between two capture file checks
    pub const CAPTURE_POLL_MS: u64 = 250;

    /// Longest excerpt of command output copied into log records
    pub const EXCERPT_CHARS: usize = 280;
}

/// Truncate `text` to at most `max_chars` characters, appending an ellipsis
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Builder helpers for creating records
impl TerminalUpdate {
    /// Terminal update for a successful execution
    pub fn success(result: impl Into<String>, screenshot_url: Option<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            result: Some(result.into()),
            error_log: None,
            screenshot_url,
        }
    }

    /// Terminal update for a failed or rejected command
    pub fn error(error_log: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            result: None,
            error_log: Some(error_log.into()),
            screenshot_url: None,
        }
    }
}

impl HeartbeatRecord {
    /// Create a heartbeat stamped with the current time
    pub fn new(relay_id: impl Into<String>, target_connected: bool, version: impl Into<String>) -> Self {
        Self {
            relay_id: relay_id.into(),
            last_ping: now_utc(),
            target_connected,
            relay_version: version.into(),
        }
    }
}

impl EventLogEntry {
    /// Create an event log entry stamped with the current time
    pub fn new(
        project_id: Option<String>,
        event_type: EventType,
        agent_name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            event_type,
            agent_name: agent_name.into(),
            detail: detail.into(),
            timestamp: now_utc(),
        }
    }
}
