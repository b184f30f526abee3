//! Row codec for the queue store
//!
//! Rows arrive as JSON objects and are normalized here, once, into the
//! canonical [`Command`] shape:
//! ```text
//! { id, code | python_code, project_id?, command_type?, status,
//!   result?, error_log?, screenshot_url?, created_at, executed_at? }
//! ```
//! Outgoing writes (terminal updates, heartbeat, event log, timeline) are
//! encoded into the JSON bodies the store expects.

use serde_json::{json, Map, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{
    format_timestamp, Command, CommandStatus, CommandType, EventLogEntry, HeartbeatRecord,
    TerminalUpdate, TimelineEntry,
};

/// Errors that can occur while decoding store responses
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of rows, got {0}")]
    NotAnArray(&'static str),

    #[error("Row is missing its id")]
    MissingId,
}

/// Ids and project keys may be uuids, strings or integers
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(raw: Option<String>) -> Option<OffsetDateTime> {
    raw.and_then(|s| OffsetDateTime::parse(s.trim(), &Rfc3339).ok())
}

/// Field reader that notes every value of the wrong JSON type
struct RowFields {
    fields: Map<String, Value>,
    problems: Vec<String>,
}

impl RowFields {
    /// Text column: absent and null are `None`, anything but a string is a problem
    fn text(&mut self, name: &str) -> Option<String> {
        match self.fields.remove(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                self.problems
                    .push(format!("`{}` must be a string, got {}", name, type_name(&other)));
                None
            }
        }
    }

    /// Key column: strings or numbers
    fn key(&mut self, name: &str) -> Option<String> {
        match self.fields.remove(name) {
            None | Some(Value::Null) => None,
            Some(value @ (Value::String(_) | Value::Number(_))) => scalar_to_string(value),
            Some(other) => {
                self.problems
                    .push(format!("`{}` must be a string or number, got {}", name, type_name(&other)));
                None
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a single row into a canonical command
///
/// Only a row without a usable id is an error. Columns of the wrong type are
/// dropped and listed in [`Command::malformed`], so the row can still be
/// claimed and failed instead of staying pending forever.
pub fn decode_row(value: Value) -> Result<Command, CodecError> {
    let fields = match value {
        Value::Object(fields) => fields,
        _ => return Err(CodecError::MissingId),
    };
    let mut row = RowFields {
        fields,
        problems: Vec::new(),
    };

    let id = row
        .fields
        .remove("id")
        .and_then(scalar_to_string)
        .ok_or(CodecError::MissingId)?;

    // `code` wins when both are present and non-empty
    let code = match (row.text("code"), row.text("python_code")) {
        (Some(code), _) if !code.trim().is_empty() => code,
        (_, Some(alias)) => alias,
        (Some(code), None) => code,
        (None, None) => String::new(),
    };

    let command_type = CommandType::parse(row.text("command_type").as_deref());
    let project_id = row.key("project_id");
    let status = row
        .text("status")
        .as_deref()
        .and_then(CommandStatus::parse)
        .unwrap_or_default();
    let result = row.text("result");
    let error_log = row.text("error_log");
    let screenshot_url = row.text("screenshot_url");
    let created_at = parse_timestamp(row.text("created_at"));
    let executed_at = parse_timestamp(row.text("executed_at"));

    let malformed =
        (!row.problems.is_empty()).then(|| format!("Malformed command row: {}", row.problems.join("; ")));

    Ok(Command {
        id,
        code,
        command_type,
        project_id,
        status,
        result,
        error_log,
        screenshot_url,
        created_at,
        executed_at,
        malformed,
    })
}

/// Decode a response body holding an array of rows
///
/// Returns the decoded commands plus one error per row that could not be
/// normalized; the caller decides how loudly to report those.
pub fn decode_rows(body: &[u8]) -> Result<(Vec<Command>, Vec<CodecError>), CodecError> {
    let value: Value = serde_json::from_slice(body)?;
    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(_) => return Err(CodecError::NotAnArray("object")),
        _ => return Err(CodecError::NotAnArray("scalar")),
    };

    let mut commands = Vec::with_capacity(rows.len());
    let mut rejected = Vec::new();
    for row in rows {
        match decode_row(row) {
            Ok(command) => commands.push(command),
            Err(e) => rejected.push(e),
        }
    }
    Ok((commands, rejected))
}

/// Body for the claim write
pub fn encode_claim() -> Value {
    json!({ "status": CommandStatus::Executing.as_str() })
}

/// Body for the terminal write. Only the fields matching the status are set.
pub fn encode_terminal(update: &TerminalUpdate, executed_at: OffsetDateTime) -> Value {
    let mut body = Map::new();
    body.insert("status".into(), json!(update.status.as_str()));
    match update.status {
        CommandStatus::Success => {
            body.insert("result".into(), json!(update.result.clone().unwrap_or_default()));
            if let Some(url) = &update.screenshot_url {
                body.insert("screenshot_url".into(), json!(url));
            }
        }
        _ => {
            body.insert(
                "error_log".into(),
                json!(update.error_log.clone().unwrap_or_default()),
            );
        }
    }
    body.insert("executed_at".into(), json!(format_timestamp(executed_at)));
    Value::Object(body)
}

/// Body for the heartbeat upsert
pub fn encode_heartbeat(record: &HeartbeatRecord) -> Value {
    json!({
        "id": record.relay_id,
        "last_ping": format_timestamp(record.last_ping),
        "ue5_connected": record.target_connected,
        "relay_version": record.relay_version,
    })
}

/// Body for an event log insert
pub fn encode_event(entry: &EventLogEntry) -> Value {
    json!({
        "project_id": entry.project_id,
        "event_type": entry.event_type.as_str(),
        "agent_name": entry.agent_name,
        "detail": entry.detail,
        "created_at": format_timestamp(entry.timestamp),
    })
}

/// Body for a timeline insert
pub fn encode_timeline(entry: &TimelineEntry) -> Value {
    json!({
        "project_id": entry.project_id,
        "agent_name": entry.agent_name,
        "agent_title": entry.agent_title,
        "content": entry.content,
        "turn_type": "execution",
        "screenshot_url": entry.screenshot_url,
    })
}
