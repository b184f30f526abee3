//! Artifact store abstraction

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::local;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upload returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

/// Durable storage for captured artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key` and return a retrievable locator
    async fn upload(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<String, StoreError>;

    /// Most recently modified file in `directory`, if any
    async fn resolve_latest(&self, directory: &Path) -> Option<PathBuf> {
        local::latest_file(directory).await
    }
}
