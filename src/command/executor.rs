//! Command executor - claims, validates and dispatches queued commands

use std::sync::Arc;
use tracing::{error, info, warn};
use ue_relay_shared::health::{HealthChange, TargetHealth};
use ue_relay_shared::state_machine::{CommandLifecycle, LifecycleEvent, TransitionResult};
use ue_relay_shared::{
    excerpt, relay, Command, CommandStatus, CommandType, EventLogEntry, EventType, TerminalUpdate,
};

use super::capture::CapturePipeline;
use crate::clock::Clock;
use crate::config::CapturePolicy;
use crate::queue::{ClaimOutcome, QueueClient, QueueError};
use crate::target::script::reported_capture_path;
use crate::target::{ExecutionError, TargetClient};

/// Result of driving one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Target acknowledged the command
    Completed { screenshot_url: Option<String> },
    /// Target unreachable or execution failed
    Failed { message: String },
    /// Refused before dispatch (malformed row, unknown type, empty payload)
    Rejected { message: String },
    /// Another relay owns the row; nothing was written
    Skipped,
}

/// Drives a single command from pending to a terminal status
pub struct CommandExecutor {
    queue: Arc<dyn QueueClient>,
    target: Arc<dyn TargetClient>,
    capture: CapturePipeline,
    policy: CapturePolicy,
    agent_name: String,
}

impl CommandExecutor {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        target: Arc<dyn TargetClient>,
        capture: CapturePipeline,
        policy: CapturePolicy,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            target,
            capture,
            policy,
            agent_name: agent_name.into(),
        }
    }

    /// Execute a command and write its terminal status
    ///
    /// Only queue failures on the claim or the terminal write are returned;
    /// every target, capture and event-log failure is absorbed here.
    pub async fn execute(
        &self,
        command: &Command,
        health: &mut TargetHealth,
        clock: &Clock,
    ) -> Result<CommandOutcome, QueueError> {
        info!(
            "Command {} received: type={} payload={}",
            command.short_id(),
            command.command_type,
            excerpt(&command.code, 60)
        );

        if self.queue.mark_executing(&command.id).await? == ClaimOutcome::AlreadyTaken {
            info!("Command {} already claimed elsewhere, skipping", command.short_id());
            return Ok(CommandOutcome::Skipped);
        }

        let mut lifecycle = CommandLifecycle::new(&command.id);
        self.apply(&mut lifecycle, LifecycleEvent::Claimed);

        let outcome = self.dispatch(command, &mut lifecycle, health, clock).await;

        let Some(update) = lifecycle.take_terminal_update() else {
            error!(
                "Command {} left in {} without a terminal update",
                command.short_id(),
                lifecycle.state()
            );
            return Ok(outcome);
        };
        self.queue.mark_terminal(&command.id, &update).await?;

        match &outcome {
            CommandOutcome::Completed { .. } => info!("Command {} succeeded", command.short_id()),
            CommandOutcome::Failed { message } | CommandOutcome::Rejected { message } => {
                warn!("Command {} failed: {}", command.short_id(), message)
            }
            CommandOutcome::Skipped => {}
        }

        self.record_event(command, &update).await;
        Ok(outcome)
    }

    /// Run everything between the claim and the terminal write
    async fn dispatch(
        &self,
        command: &Command,
        lifecycle: &mut CommandLifecycle,
        health: &mut TargetHealth,
        clock: &Clock,
    ) -> CommandOutcome {
        if let Some(reason) = validate(command) {
            self.apply(lifecycle, LifecycleEvent::Rejected { reason: reason.clone() });
            return CommandOutcome::Rejected { message: reason };
        }

        let now = clock.now_ms();
        if health.is_known_unreachable(now) {
            let reason = format!(
                "UE5 not reachable at {} (next connectivity check in {}s)",
                self.target.endpoint(),
                health.recheck_in_ms(now).div_ceil(1000)
            );
            self.apply(lifecycle, LifecycleEvent::TargetUnreachable { reason: reason.clone() });
            return CommandOutcome::Failed { message: reason };
        }

        let reachable = self.target.probe().await;
        log_health_change(health.record_probe(reachable, clock.now_ms()), self.target.endpoint());
        if !reachable {
            let reason = format!(
                "UE5 not reachable at {}: connectivity probe failed",
                self.target.endpoint()
            );
            self.apply(lifecycle, LifecycleEvent::TargetUnreachable { reason: reason.clone() });
            return CommandOutcome::Failed { message: reason };
        }

        info!("Command {} executing", command.short_id());
        let output = match self.target.execute(&command.code).await {
            Ok(output) => output,
            Err(e) => {
                if matches!(e, ExecutionError::NotConnected { .. }) {
                    log_health_change(health.record_probe(false, clock.now_ms()), self.target.endpoint());
                }
                let message = e.to_string();
                self.apply(lifecycle, LifecycleEvent::ExecutionFailed { detail: message.clone() });
                return CommandOutcome::Failed { message };
            }
        };
        self.apply(lifecycle, LifecycleEvent::ExecutionSucceeded { output: output.clone() });

        // A path reported in the output is always collected, whatever the policy
        let mut screenshot_url = None;
        let reported = reported_capture_path(&output).is_some();
        if reported || self.policy.wants_capture(command.command_type.requests_capture()) {
            match self.capture.run(command, &output).await {
                Ok(Some(locator)) => {
                    self.apply(lifecycle, LifecycleEvent::ArtifactCaptured { locator: locator.clone() });
                    screenshot_url = Some(locator);
                }
                Ok(None) => {}
                Err(e) => warn!("Capture for {} failed: {}", command.short_id(), e),
            }
        }

        CommandOutcome::Completed { screenshot_url }
    }

    fn apply(&self, lifecycle: &mut CommandLifecycle, event: LifecycleEvent) {
        if let TransitionResult::Invalid { from, event } = lifecycle.process_event(event) {
            error!(
                "Invalid transition for {} from {}: {:?}",
                lifecycle.command_id(),
                from,
                event
            );
        }
    }

    /// Append the event-log entry for a finished command; failures only warn
    async fn record_event(&self, command: &Command, update: &TerminalUpdate) {
        let entries = match update.status {
            CommandStatus::Success => {
                let mut entries = vec![EventLogEntry::new(
                    command.project_id.clone(),
                    EventType::Execution,
                    &self.agent_name,
                    format!(
                        "Executed {}: {}",
                        command.short_id(),
                        excerpt(update.result.as_deref().unwrap_or_default(), relay::EXCERPT_CHARS)
                    ),
                )];
                if let Some(url) = &update.screenshot_url {
                    entries.push(EventLogEntry::new(
                        command.project_id.clone(),
                        EventType::Screenshot,
                        &self.agent_name,
                        format!("Captured {}: {}", command.short_id(), url),
                    ));
                }
                entries
            }
            _ => vec![EventLogEntry::new(
                command.project_id.clone(),
                EventType::Error,
                &self.agent_name,
                format!(
                    "Command {} failed: {}",
                    command.short_id(),
                    update.error_log.as_deref().unwrap_or_default()
                ),
            )],
        };

        for entry in entries {
            if let Err(e) = self.queue.append_event(&entry).await {
                warn!("Failed to append {} event for {}: {}", entry.event_type.as_str(), command.short_id(), e);
            }
        }
    }
}

/// Reason a command cannot be dispatched, if any
fn validate(command: &Command) -> Option<String> {
    if let Some(reason) = &command.malformed {
        return Some(reason.clone());
    }
    if let CommandType::Unknown(raw) = &command.command_type {
        return Some(format!("Unknown command type: {}", raw));
    }
    if command.code.trim().is_empty() {
        return Some("Empty command payload".to_string());
    }
    None
}

/// Narrate reachability flips
pub fn log_health_change(change: Option<HealthChange>, endpoint: &str) {
    match change {
        Some(HealthChange::Connected) => info!("UE5 reachable at {}", endpoint),
        Some(HealthChange::Disconnected) => warn!("UE5 unreachable at {}", endpoint),
        None => {}
    }
}
