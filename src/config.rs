//! Process configuration
//!
//! Every option can be given as a flag or through the environment. The queue
//! endpoint and key are mandatory; without them the relay refuses to start.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use ue_relay_shared::relay;

use crate::command::CaptureSettings;
use crate::relay::RelaySettings;

/// When the capture sub-flow runs after a successful execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CapturePolicy {
    /// Only for commands whose type asks for a capture
    #[default]
    OnRequest,
    /// After every successful execution ("live vision")
    Always,
}

impl CapturePolicy {
    /// Whether a successful command of this type should be captured
    pub fn wants_capture(&self, requested: bool) -> bool {
        match self {
            CapturePolicy::OnRequest => requested,
            CapturePolicy::Always => true,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "ue-relay", version, about = "Relays queued commands to the UE5 Remote Control API")]
pub struct RelayConfig {
    /// Queue store base URL, e.g. https://xxxxx.supabase.co
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: String,

    /// Queue store API key
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: String,

    /// UE5 Remote Control base URL
    #[arg(long, env = "UE5_REMOTE_CONTROL_URL", default_value = "http://localhost:30010")]
    pub target_url: String,

    /// Identity of this relay in the heartbeat table
    #[arg(long, env = "RELAY_ID", default_value = "local-relay")]
    pub relay_id: String,

    /// Name written into event log entries
    #[arg(long, env = "RELAY_AGENT_NAME", default_value = "UE5 Relay")]
    pub agent_name: String,

    /// Sleep between queue polls, in milliseconds
    #[arg(long, env = "RELAY_POLL_INTERVAL_MS", default_value_t = relay::POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// Maximum commands fetched per poll
    #[arg(long, env = "RELAY_BATCH_LIMIT", default_value_t = relay::BATCH_LIMIT)]
    pub batch_limit: usize,

    /// Poll interval multiplier used after a failed iteration
    #[arg(long, env = "RELAY_ERROR_BACKOFF", default_value_t = relay::ERROR_BACKOFF_MULTIPLIER)]
    pub error_backoff_multiplier: u32,

    /// Heartbeat cadence, in milliseconds
    #[arg(long, env = "RELAY_HEARTBEAT_INTERVAL_MS", default_value_t = relay::HEARTBEAT_INTERVAL_MS)]
    pub heartbeat_interval_ms: u64,

    /// How long a failed probe is trusted before re-probing, in milliseconds
    #[arg(long, env = "RELAY_RECHECK_INTERVAL_MS", default_value_t = relay::CONNECTIVITY_RECHECK_MS)]
    pub recheck_interval_ms: u64,

    /// Probe timeout, in milliseconds
    #[arg(long, env = "UE5_PROBE_TIMEOUT_MS", default_value_t = relay::PROBE_TIMEOUT_MS)]
    pub probe_timeout_ms: u64,

    /// Execute timeout, in milliseconds
    #[arg(long, env = "UE5_EXECUTE_TIMEOUT_MS", default_value_t = relay::EXECUTE_TIMEOUT_MS)]
    pub execute_timeout_ms: u64,

    /// Directory the target writes captures into
    #[arg(long, env = "UE5_CAPTURE_DIR", default_value = "C:/GrandStudio/Screenshots")]
    pub capture_dir: PathBuf,

    /// Rendering delay before looking for a capture, in milliseconds
    #[arg(long, env = "UE5_CAPTURE_SETTLE_MS", default_value_t = relay::CAPTURE_SETTLE_MS)]
    pub capture_settle_ms: u64,

    /// Upper bound on waiting for a capture to finish writing, in milliseconds
    #[arg(long, env = "UE5_CAPTURE_TIMEOUT_MS", default_value_t = relay::CAPTURE_WRITE_TIMEOUT_MS)]
    pub capture_timeout_ms: u64,

    /// When to capture after a successful execution
    #[arg(long, env = "RELAY_CAPTURE_POLICY", value_enum, default_value_t = CapturePolicy::OnRequest)]
    pub capture_policy: CapturePolicy,

    /// Storage bucket for uploaded captures
    #[arg(long, env = "RELAY_STORAGE_BUCKET", default_value = "ue5-captures")]
    pub storage_bucket: String,

    /// Table holding queued commands
    #[arg(long, env = "RELAY_COMMANDS_TABLE", default_value = "ue5_commands")]
    pub commands_table: String,

    /// Table holding the heartbeat singleton
    #[arg(long, env = "RELAY_HEARTBEAT_TABLE", default_value = "relay_heartbeat")]
    pub heartbeat_table: String,

    /// Append-only event log table
    #[arg(long, env = "RELAY_EVENTS_TABLE", default_value = "god_eye_log")]
    pub events_table: String,

    /// Conversational timeline table
    #[arg(long, env = "RELAY_TIMELINE_TABLE", default_value = "chat_turns")]
    pub timeline_table: String,
}

impl RelayConfig {
    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.supabase_key.trim().is_empty() {
            bail!("SUPABASE_KEY is empty");
        }
        parse_base_url(&self.supabase_url).context("invalid SUPABASE_URL")?;
        parse_base_url(&self.target_url).context("invalid UE5_REMOTE_CONTROL_URL")?;
        if self.batch_limit == 0 {
            bail!("batch limit must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll interval must be greater than zero");
        }
        Ok(())
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            relay_id: self.relay_id.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            batch_limit: self.batch_limit,
            error_backoff_multiplier: self.error_backoff_multiplier.max(1),
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            recheck_interval_ms: self.recheck_interval_ms,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            capture_dir: self.capture_dir.clone(),
            settle: Duration::from_millis(self.capture_settle_ms),
            write_timeout: Duration::from_millis(self.capture_timeout_ms),
            poll_interval: Duration::from_millis(relay::CAPTURE_POLL_MS),
        }
    }
}

/// Parse an http(s) base URL, dropping any trailing slash
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim().trim_end_matches('/'))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported scheme {:?}", url.scheme());
    }
    if url.host_str().is_none() {
        bail!("missing host");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<RelayConfig, clap::Error> {
        let mut args = vec![
            "ue-relay",
            "--supabase-url",
            "https://example.supabase.co",
            "--supabase-key",
            "anon",
        ];
        args.extend_from_slice(extra);
        RelayConfig::try_parse_from(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.target_url, "http://localhost:30010");
        assert_eq!(config.batch_limit, relay::BATCH_LIMIT);
        assert_eq!(config.capture_policy, CapturePolicy::OnRequest);
        assert_eq!(config.commands_table, "ue5_commands");
        config.validate().unwrap();

        let settings = config.relay_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(relay::POLL_INTERVAL_MS));
        assert_eq!(settings.error_backoff_multiplier, relay::ERROR_BACKOFF_MULTIPLIER);
    }

    #[test]
    fn test_capture_policy_flag() {
        let config = parse(&["--capture-policy", "always"]).unwrap();
        assert_eq!(config.capture_policy, CapturePolicy::Always);
        assert!(config.capture_policy.wants_capture(false));
        assert!(!CapturePolicy::OnRequest.wants_capture(false));
        assert!(CapturePolicy::OnRequest.wants_capture(true));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = parse(&["--batch-limit", "0"]).unwrap();
        assert!(config.validate().is_err());

        let config = parse(&["--target-url", "ftp://localhost"]).unwrap();
        assert!(config.validate().is_err());

        let mut config = parse(&[]).unwrap();
        config.supabase_key = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_base_url_trims_slash() {
        let url = parse_base_url("http://localhost:30010/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:30010/");
        assert_eq!(url.port(), Some(30010));
    }
}
