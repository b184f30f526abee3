//! PostgREST (Supabase) queue backend

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use ue_relay_shared::{
    codec, now_utc, Command, EventLogEntry, HeartbeatRecord, TerminalUpdate, TimelineEntry,
};

use super::traits::{ClaimOutcome, QueueClient, QueueError};

/// Timeout for every store request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Base URL plus key, shared by the REST and storage bindings
#[derive(Debug, Clone)]
pub struct SupabaseEndpoint {
    base: String,
    key: String,
}

impl SupabaseEndpoint {
    pub fn new(base_url: &Url, key: impl Into<String>) -> Self {
        Self {
            base: base_url.as_str().trim_end_matches('/').to_string(),
            key: key.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Attach the api key headers to a request
    pub fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
    }
}

/// Table names used by the relay
#[derive(Debug, Clone)]
pub struct QueueTables {
    pub commands: String,
    pub heartbeat: String,
    pub events: String,
    pub timeline: String,
}

impl Default for QueueTables {
    fn default() -> Self {
        Self {
            commands: "ue5_commands".into(),
            heartbeat: "relay_heartbeat".into(),
            events: "god_eye_log".into(),
            timeline: "chat_turns".into(),
        }
    }
}

/// Queue client speaking the PostgREST dialect
pub struct SupabaseQueue {
    http: Client,
    endpoint: SupabaseEndpoint,
    tables: QueueTables,
}

impl SupabaseQueue {
    /// Create a new queue client
    pub fn new(endpoint: SupabaseEndpoint, tables: QueueTables) -> Result<Self, QueueError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint,
            tables,
        })
    }

    fn table_url(&self, table: &str, params: &[(&str, &str)]) -> Result<Url, QueueError> {
        let raw = format!("{}/rest/v1/{}", self.endpoint.base(), table);
        Url::parse_with_params(&raw, params).map_err(|e| QueueError::InvalidUrl(e.to_string()))
    }

    async fn insert(&self, table: &str, body: &Value, params: &[(&str, &str)], prefer: &str) -> Result<(), QueueError> {
        let url = self.table_url(table, params)?;
        let resp = self
            .endpoint
            .authorize(self.http.post(url))
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into a `QueueError::Status`
async fn check(resp: Response) -> Result<Response, QueueError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(QueueError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl QueueClient for SupabaseQueue {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<Command>, QueueError> {
        let limit = limit.max(1).to_string();
        let url = self.table_url(
            &self.tables.commands,
            &[
                ("select", "*"),
                ("status", "eq.pending"),
                ("order", "created_at.asc"),
                ("limit", limit.as_str()),
            ],
        )?;

        let resp = self.endpoint.authorize(self.http.get(url)).send().await?;
        let body = check(resp).await?.bytes().await?;
        let (commands, rejected) = codec::decode_rows(&body)?;
        for e in rejected {
            warn!("Skipping malformed command row: {}", e);
        }
        Ok(commands)
    }

    async fn mark_executing(&self, id: &str) -> Result<ClaimOutcome, QueueError> {
        let id_filter = format!("eq.{}", id);
        let url = self.table_url(
            &self.tables.commands,
            &[("id", id_filter.as_str()), ("status", "eq.pending")],
        )?;

        let resp = self
            .endpoint
            .authorize(self.http.patch(url))
            .header("Prefer", "return=representation")
            .json(&codec::encode_claim())
            .send()
            .await?;
        let body = check(resp).await?.bytes().await?;
        let (claimed, _) = codec::decode_rows(&body)?;

        if claimed.is_empty() {
            debug!("Claim on {} matched no pending row", id);
            Ok(ClaimOutcome::AlreadyTaken)
        } else {
            Ok(ClaimOutcome::Claimed)
        }
    }

    async fn mark_terminal(&self, id: &str, update: &TerminalUpdate) -> Result<(), QueueError> {
        let id_filter = format!("eq.{}", id);
        let url = self.table_url(
            &self.tables.commands,
            &[("id", id_filter.as_str()), ("status", "eq.executing")],
        )?;

        let resp = self
            .endpoint
            .authorize(self.http.patch(url))
            .header("Prefer", "return=minimal")
            .json(&codec::encode_terminal(update, now_utc()))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn upsert_heartbeat(&self, record: &HeartbeatRecord) -> Result<(), QueueError> {
        self.insert(
            &self.tables.heartbeat,
            &codec::encode_heartbeat(record),
            &[("on_conflict", "id")],
            "resolution=merge-duplicates,return=minimal",
        )
        .await
    }

    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), QueueError> {
        self.insert(&self.tables.events, &codec::encode_event(entry), &[], "return=minimal")
            .await
    }

    async fn append_timeline(&self, entry: &TimelineEntry) -> Result<(), QueueError> {
        self.insert(
            &self.tables.timeline,
            &codec::encode_timeline(entry),
            &[],
            "return=minimal",
        )
        .await
    }
}
