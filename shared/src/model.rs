//! Canonical in-memory shapes for queue rows and side-effect records

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Lifecycle status of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    #[default]
    Pending,
    Executing,
    Success,
    Error,
}

impl CommandStatus {
    /// Wire representation used by the queue store
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executing => "executing",
            CommandStatus::Success => "success",
            CommandStatus::Error => "error",
        }
    }

    /// Parse a wire status, case-insensitively
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(CommandStatus::Pending),
            "executing" => Some(CommandStatus::Executing),
            "success" => Some(CommandStatus::Success),
            "error" => Some(CommandStatus::Error),
            _ => None,
        }
    }

    /// Success and Error are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Error)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch path selected by the producer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommandType {
    /// Run the payload against the target
    #[default]
    Execute,
    /// Run the payload, then capture a screenshot of the result
    Screenshot,
    /// A type this relay does not know how to dispatch
    Unknown(String),
}

impl CommandType {
    /// Normalize the optional wire value. Absent or blank means `Execute`.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return CommandType::Execute;
        };
        match raw.to_ascii_lowercase().as_str() {
            "execute" | "exec" | "python" => CommandType::Execute,
            "screenshot" | "capture" => CommandType::Screenshot,
            _ => CommandType::Unknown(raw.to_string()),
        }
    }

    /// Whether this command explicitly asks for an artifact capture
    pub fn requests_capture(&self) -> bool {
        matches!(self, CommandType::Screenshot)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::Execute => f.write_str("execute"),
            CommandType::Screenshot => f.write_str("screenshot"),
            CommandType::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// A unit of work fetched from the queue, normalized at the boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: String,
    /// Opaque payload, taken from `code` or its `python_code` alias
    pub code: String,
    pub command_type: CommandType,
    pub project_id: Option<String>,
    pub status: CommandStatus,
    pub result: Option<String>,
    pub error_log: Option<String>,
    pub screenshot_url: Option<String>,
    pub created_at: Option<OffsetDateTime>,
    pub executed_at: Option<OffsetDateTime>,
    /// Why the row could not be fully normalized. Such a command is still
    /// claimed, then failed with this message.
    pub malformed: Option<String>,
}

impl Command {
    /// Create a pending command with the given payload
    pub fn pending(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            command_type: CommandType::Execute,
            project_id: None,
            status: CommandStatus::Pending,
            result: None,
            error_log: None,
            screenshot_url: None,
            created_at: None,
            executed_at: None,
            malformed: None,
        }
    }

    /// First eight characters of the id, for log lines
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

/// Final write for a command leaving `executing`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalUpdate {
    pub status: CommandStatus,
    pub result: Option<String>,
    pub error_log: Option<String>,
    pub screenshot_url: Option<String>,
}

/// Singleton liveness row, fully overwritten on each tick
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRecord {
    pub relay_id: String,
    pub last_ping: OffsetDateTime,
    pub target_connected: bool,
    pub relay_version: String,
}

/// Category of an event log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Execution,
    Screenshot,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Execution => "execution",
            EventType::Screenshot => "screenshot",
            EventType::Error => "error",
        }
    }
}

/// Append-only observability record, never read back by the relay
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub project_id: Option<String>,
    pub event_type: EventType,
    pub agent_name: String,
    pub detail: String,
    pub timestamp: OffsetDateTime,
}

/// Conversational timeline record emitted after a successful capture upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub project_id: String,
    pub agent_name: String,
    pub agent_title: String,
    pub content: String,
    pub screenshot_url: String,
}
