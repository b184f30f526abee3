//! In-memory collaborators for engine and loop tests

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ue_relay_shared::state_machine::is_valid_transition;
use ue_relay_shared::{
    now_utc, Command, CommandStatus, EventLogEntry, HeartbeatRecord, TerminalUpdate, TimelineEntry,
};

use crate::artifact::{ArtifactStore, StoreError};
use crate::clock::Clock;
use crate::command::{CapturePipeline, CaptureSettings, CommandExecutor};
use crate::config::CapturePolicy;
use crate::queue::{ClaimOutcome, QueueClient, QueueError};
use crate::target::{CaptureError, ExecutionError, TargetClient};

#[derive(Default)]
pub struct QueueState {
    pub rows: Vec<Command>,
    pub fetch_calls: usize,
    pub claims: Vec<String>,
    pub terminal_calls: Vec<(String, TerminalUpdate)>,
    pub heartbeats: Vec<HeartbeatRecord>,
    pub events: Vec<EventLogEntry>,
    pub timeline: Vec<TimelineEntry>,
    /// Rows the fake reports as claimed by another relay
    pub foreign_claims: Vec<String>,
}

/// Queue store kept in memory, with failure switches
#[derive(Default)]
pub struct FakeQueue {
    pub state: Mutex<QueueState>,
    pub fail_fetch: AtomicBool,
    pub fail_heartbeat: AtomicBool,
    pub fail_events: AtomicBool,
}

impl FakeQueue {
    pub fn with_rows(rows: Vec<Command>) -> Arc<Self> {
        let queue = Self::default();
        queue.state.lock().unwrap().rows = rows;
        Arc::new(queue)
    }

    pub fn row(&self, id: &str) -> Command {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .unwrap()
    }

    pub fn terminal_calls(&self) -> Vec<(String, TerminalUpdate)> {
        self.state.lock().unwrap().terminal_calls.clone()
    }

    pub fn events(&self) -> Vec<EventLogEntry> {
        self.state.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl QueueClient for FakeQueue {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Command>, QueueError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(QueueError::Status {
                status: 503,
                body: "connection reset".into(),
            });
        }
        Ok(state
            .rows
            .iter()
            .filter(|r| r.status == CommandStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_executing(&self, id: &str) -> Result<ClaimOutcome, QueueError> {
        let mut state = self.state.lock().unwrap();
        state.claims.push(id.to_string());
        if state.foreign_claims.iter().any(|f| f == id) {
            return Ok(ClaimOutcome::AlreadyTaken);
        }
        match state
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.status == CommandStatus::Pending)
        {
            Some(row) => {
                assert!(is_valid_transition(row.status, CommandStatus::Executing));
                row.status = CommandStatus::Executing;
                Ok(ClaimOutcome::Claimed)
            }
            None => Ok(ClaimOutcome::AlreadyTaken),
        }
    }

    async fn mark_terminal(&self, id: &str, update: &TerminalUpdate) -> Result<(), QueueError> {
        assert!(
            is_valid_transition(CommandStatus::Executing, update.status),
            "terminal write for {id} carries non-terminal status {:?}",
            update.status
        );
        let mut state = self.state.lock().unwrap();
        state.terminal_calls.push((id.to_string(), update.clone()));
        if let Some(row) = state
            .rows
            .iter_mut()
            .find(|r| r.id == id && r.status == CommandStatus::Executing)
        {
            row.status = update.status;
            row.result = update.result.clone();
            row.error_log = update.error_log.clone();
            row.screenshot_url = update.screenshot_url.clone();
            row.executed_at = Some(now_utc());
        }
        Ok(())
    }

    async fn upsert_heartbeat(&self, record: &HeartbeatRecord) -> Result<(), QueueError> {
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(QueueError::Status {
                status: 503,
                body: "heartbeat table locked".into(),
            });
        }
        self.state.lock().unwrap().heartbeats.push(record.clone());
        Ok(())
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), QueueError> {
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(QueueError::Status {
                status: 503,
                body: "event log offline".into(),
            });
        }
        self.state.lock().unwrap().events.push(entry.clone());
        Ok(())
    }

    async fn append_timeline(&self, entry: &TimelineEntry) -> Result<(), QueueError> {
        self.state.lock().unwrap().timeline.push(entry.clone());
        Ok(())
    }
}

/// Target with canned responses and call counters
pub struct FakeTarget {
    pub reachable: AtomicBool,
    pub probe_calls: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
    pub captures: Mutex<Vec<PathBuf>>,
    /// Per-payload failures and outputs; everything else answers "ok"
    pub failures: Mutex<HashMap<String, ExecutionError>>,
    pub responses: Mutex<HashMap<String, String>>,
    /// Bytes the fake editor writes at the capture destination, if any
    pub capture_bytes: Mutex<Option<Vec<u8>>>,
    pub fail_capture: AtomicBool,
}

impl FakeTarget {
    pub fn reachable() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(true),
            probe_calls: AtomicUsize::new(0),
            executed: Mutex::default(),
            captures: Mutex::default(),
            failures: Mutex::default(),
            responses: Mutex::default(),
            capture_bytes: Mutex::new(Some(b"\x89PNG fake".to_vec())),
            fail_capture: AtomicBool::new(false),
        })
    }

    pub fn unreachable() -> Arc<Self> {
        let target = Self::reachable();
        target.reachable.store(false, Ordering::SeqCst);
        target
    }

    pub fn fail_on(&self, code: &str, error: ExecutionError) {
        self.failures.lock().unwrap().insert(code.to_string(), error);
    }

    pub fn respond_with(&self, code: &str, output: impl Into<String>) {
        self.responses.lock().unwrap().insert(code.to_string(), output.into());
    }

    pub fn execute_calls(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TargetClient for FakeTarget {
    async fn probe(&self) -> bool {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }

    async fn execute(&self, code: &str) -> Result<String, ExecutionError> {
        self.executed.lock().unwrap().push(code.to_string());
        if let Some(err) = self.failures.lock().unwrap().get(code) {
            return Err(err.clone());
        }
        let output = self.responses.lock().unwrap().get(code).cloned();
        Ok(output.unwrap_or_else(|| "ok".to_string()))
    }

    async fn trigger_capture(&self, destination: &Path) -> Result<PathBuf, CaptureError> {
        self.captures.lock().unwrap().push(destination.to_path_buf());
        if self.fail_capture.load(Ordering::SeqCst) {
            return Err(CaptureError::Trigger(ExecutionError::Transport(
                "capture script raised".into(),
            )));
        }
        let bytes = self.capture_bytes.lock().unwrap().clone();
        if let Some(bytes) = bytes {
            if let Some(dir) = destination.parent() {
                std::fs::create_dir_all(dir).unwrap();
            }
            std::fs::write(destination, bytes).unwrap();
        }
        Ok(destination.to_path_buf())
    }

    fn endpoint(&self) -> &str {
        "http://ue5.test:30010"
    }
}

/// Artifact store that records uploads and hands out fake CDN URLs
#[derive(Default)]
pub struct FakeArtifacts {
    pub uploads: Mutex<Vec<(String, usize, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn upload(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<String, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 500,
                body: "storage down".into(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.len(), content_type.to_string()));
        Ok(format!("https://cdn.test/{}", key))
    }
}

/// Capture settings fast enough for tests, rooted in `dir`
pub fn fast_capture(dir: &Path) -> CaptureSettings {
    CaptureSettings {
        capture_dir: dir.to_path_buf(),
        settle: Duration::ZERO,
        write_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    }
}

/// Everything an engine test needs, wired together
pub struct Harness {
    pub queue: Arc<FakeQueue>,
    pub target: Arc<FakeTarget>,
    pub artifacts: Arc<FakeArtifacts>,
    pub capture_dir: tempfile::TempDir,
    pub clock: Clock,
}

impl Harness {
    pub fn new(queue: Arc<FakeQueue>, target: Arc<FakeTarget>) -> Self {
        Self {
            queue,
            target,
            artifacts: Arc::new(FakeArtifacts::default()),
            capture_dir: tempfile::tempdir().unwrap(),
            clock: Clock::start(),
        }
    }

    pub fn executor(&self, policy: CapturePolicy) -> CommandExecutor {
        let capture = CapturePipeline::new(
            self.target.clone(),
            self.artifacts.clone(),
            self.queue.clone(),
            fast_capture(self.capture_dir.path()),
            "UE5 Relay",
        );
        CommandExecutor::new(
            self.queue.clone(),
            self.target.clone(),
            capture,
            policy,
            "UE5 Relay",
        )
    }
}
