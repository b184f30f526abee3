//! Capture sub-flow: trigger, wait for the file, upload, project to the timeline

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use ue_relay_shared::{excerpt, now_utc, relay, Command, TimelineEntry};

use crate::artifact::{local, ArtifactStore};
use crate::queue::QueueClient;
use crate::target::script::reported_capture_path;
use crate::target::{CaptureError, TargetClient};

/// Title shown next to captures in the conversational timeline
const TIMELINE_TITLE: &str = "Live Vision";

/// Where captures land and how long to wait for them
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub capture_dir: PathBuf,
    pub settle: Duration,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
}

pub struct CapturePipeline {
    target: Arc<dyn TargetClient>,
    store: Arc<dyn ArtifactStore>,
    queue: Arc<dyn QueueClient>,
    settings: CaptureSettings,
    agent_name: String,
}

impl CapturePipeline {
    pub fn new(
        target: Arc<dyn TargetClient>,
        store: Arc<dyn ArtifactStore>,
        queue: Arc<dyn QueueClient>,
        settings: CaptureSettings,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            target,
            store,
            queue,
            settings,
            agent_name: agent_name.into(),
        }
    }

    /// Capture the target state after `command` produced `output`
    ///
    /// Returns the durable locator, or `None` when the command carries no
    /// project and the capture stays local.
    pub async fn run(&self, command: &Command, output: &str) -> Result<Option<String>, CaptureError> {
        let expected = self.expected_path(command, output).await?;

        sleep(self.settings.settle).await;
        let path = self.resolve(&expected).await?;

        let Some(project_id) = command.project_id.as_deref() else {
            info!("Capture for {} kept locally at {}", command.short_id(), path.display());
            return Ok(None);
        };

        let data = tokio::fs::read(&path).await.map_err(|source| CaptureError::Read {
            path: path.clone(),
            source,
        })?;
        let key = local::artifact_key(project_id, now_utc());
        let locator = self
            .store
            .upload(Bytes::from(data), &key, "image/png")
            .await?;
        info!("Capture for {} uploaded: {}", command.short_id(), locator);

        let entry = TimelineEntry {
            project_id: project_id.to_string(),
            agent_name: self.agent_name.clone(),
            agent_title: TIMELINE_TITLE.to_string(),
            content: excerpt(output, relay::EXCERPT_CHARS),
            screenshot_url: locator.clone(),
        };
        if let Err(e) = self.queue.append_timeline(&entry).await {
            warn!("Failed to append timeline entry for {}: {}", command.short_id(), e);
        }

        Ok(Some(locator))
    }

    /// Path the capture is expected at, triggering one if the command did not
    /// report its own
    async fn expected_path(&self, command: &Command, output: &str) -> Result<PathBuf, CaptureError> {
        if let Some(reported) = reported_capture_path(output) {
            debug!("Command {} reported capture at {}", command.short_id(), reported.display());
            return Ok(reported);
        }

        let file_name = local::capture_file_name(command.short_id(), now_utc());
        let destination = self.settings.capture_dir.join(file_name);
        self.target.trigger_capture(&destination).await
    }

    /// Prefer the expected file once it is stable, else the newest capture
    async fn resolve(&self, expected: &Path) -> Result<PathBuf, CaptureError> {
        let ready = local::wait_for_artifact(
            expected,
            self.settings.poll_interval,
            self.settings.write_timeout,
        )
        .await;
        if ready {
            return Ok(expected.to_path_buf());
        }

        match self.store.resolve_latest(&self.settings.capture_dir).await {
            Some(path) => {
                warn!(
                    "Capture missing at {}, using latest {}",
                    expected.display(),
                    path.display()
                );
                Ok(path)
            }
            None => Err(CaptureError::Missing {
                expected: expected.to_path_buf(),
                directory: self.settings.capture_dir.clone(),
            }),
        }
    }
}
