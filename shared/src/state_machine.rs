//! Command Lifecycle State Machine
//!
//! Defines valid status transitions for a single fetched command:
//! ```text
//! Pending -> Executing -> { Success, Error }
//! ```
//! Terminal states never change. A capture result may still be attached to a
//! `Success` command until its terminal update has been taken for writing.

use crate::{CommandStatus, TerminalUpdate};

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The relay claimed the row
    Claimed,
    /// The command was refused before dispatch (unknown type, empty payload)
    Rejected { reason: String },
    /// The target is known or freshly found unreachable
    TargetUnreachable { reason: String },
    /// The target acknowledged the command
    ExecutionSucceeded { output: String },
    /// The target refused the command or the transport failed
    ExecutionFailed { detail: String },
    /// The capture sub-flow produced a durable locator
    ArtifactCaptured { locator: String },
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid; carries the resulting status
    Success(CommandStatus),
    /// Transition was invalid from current state
    Invalid {
        from: CommandStatus,
        event: LifecycleEvent,
    },
}

/// The lifecycle of one command inside one relay instance
#[derive(Debug)]
pub struct CommandLifecycle {
    command_id: String,
    current: CommandStatus,
    result: Option<String>,
    error_log: Option<String>,
    screenshot_url: Option<String>,
    reported: bool,
}

impl CommandLifecycle {
    /// Create a lifecycle for a freshly fetched, still pending command
    pub fn new(command_id: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            current: CommandStatus::Pending,
            result: None,
            error_log: None,
            screenshot_url: None,
            reported: false,
        }
    }

    /// Get current status
    pub fn state(&self) -> CommandStatus {
        self.current
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        use CommandStatus::*;
        use LifecycleEvent::*;

        let applied = match (self.current, &event) {
            (Pending, Claimed) => {
                self.current = Executing;
                true
            }
            (Executing, Rejected { reason } | TargetUnreachable { reason }) => {
                self.error_log = Some(reason.clone());
                self.current = Error;
                true
            }
            (Executing, ExecutionFailed { detail }) => {
                self.error_log = Some(detail.clone());
                self.current = Error;
                true
            }
            (Executing, ExecutionSucceeded { output }) => {
                self.result = Some(output.clone());
                self.current = Success;
                true
            }
            (Success, ArtifactCaptured { locator }) if !self.reported => {
                self.screenshot_url = Some(locator.clone());
                true
            }
            _ => false,
        };

        if !applied {
            return TransitionResult::Invalid {
                from: self.current,
                event,
            };
        }

        TransitionResult::Success(self.current)
    }

    /// Hand out the terminal update exactly once
    ///
    /// Returns `None` while the command is not terminal, and on every call
    /// after the first.
    pub fn take_terminal_update(&mut self) -> Option<TerminalUpdate> {
        if self.reported || !self.current.is_terminal() {
            return None;
        }
        self.reported = true;

        let update = match self.current {
            CommandStatus::Success => TerminalUpdate::success(
                self.result.clone().unwrap_or_default(),
                self.screenshot_url.clone(),
            ),
            _ => TerminalUpdate::error(self.error_log.clone().unwrap_or_default()),
        };
        Some(update)
    }
}

/// Check if a status change is allowed as seen by an external observer
///
/// Re-applying the same terminal status is a no-op and therefore valid.
pub fn is_valid_transition(from: CommandStatus, to: CommandStatus) -> bool {
    use CommandStatus::*;

    match (from, to) {
        (Pending, Executing) => true,
        (Executing, Success | Error) => true,
        (a, b) if a == b && a.is_terminal() => true,
        _ => false,
    }
}
