//! Supabase Storage backend for captured artifacts

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::traits::{ArtifactStore, StoreError};
use crate::queue::SupabaseEndpoint;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SupabaseStorage {
    http: Client,
    endpoint: SupabaseEndpoint,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(endpoint: SupabaseEndpoint, bucket: impl Into<String>) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint,
            bucket: bucket.into(),
        })
    }

    /// Public URL of an object in this bucket
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint.base(),
            self.bucket,
            key
        )
    }
}

#[async_trait]
impl ArtifactStore for SupabaseStorage {
    async fn upload(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<String, StoreError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|part| part == "..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.endpoint.base(),
            self.bucket,
            key
        );
        let size = bytes.len();
        let resp = self
            .endpoint
            .authorize(self.http.post(url))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Uploaded {} bytes to {}/{}", size, self.bucket, key);
        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use reqwest::Url;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Seen {
        uploads: Arc<Mutex<Vec<(String, String, String, usize)>>>,
    }

    async fn serve(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn storage(base: &Url) -> SupabaseStorage {
        SupabaseStorage::new(SupabaseEndpoint::new(base, "anon"), "ue5-captures").unwrap()
    }

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/storage/v1/object/{bucket}/{*key}",
                post(
                    |State(seen): State<Seen>,
                     UrlPath((bucket, key)): UrlPath<(String, String)>,
                     headers: HeaderMap,
                     body: axum::body::Bytes| async move {
                        let upsert = headers
                            .get("x-upsert")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        seen.uploads.lock().unwrap().push((bucket, key, upsert, body.len()));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(seen.clone());
        let base = serve(app).await;

        let locator = storage(&base)
            .upload(Bytes::from_static(b"png"), "screenshots/p1/1.png", "image/png")
            .await
            .unwrap();

        assert_eq!(
            locator,
            format!(
                "{}/storage/v1/object/public/ue5-captures/screenshots/p1/1.png",
                base.as_str().trim_end_matches('/')
            )
        );
        let uploads = seen.uploads.lock().unwrap();
        assert_eq!(
            uploads[0],
            ("ue5-captures".into(), "screenshots/p1/1.png".into(), "true".into(), 3)
        );
    }

    #[tokio::test]
    async fn test_upload_failure_status() {
        let app = Router::new().route(
            "/storage/v1/object/{bucket}/{*key}",
            post(|| async { (StatusCode::FORBIDDEN, "bucket policy") }),
        );
        let base = serve(app).await;

        let err = storage(&base)
            .upload(Bytes::from_static(b"png"), "screenshots/p1/1.png", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_rejects_traversal_key() {
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let err = storage(&base)
            .upload(Bytes::new(), "../secrets", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_resolve_latest_uses_local_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only.png"), b"x").unwrap();

        let base = Url::parse("http://127.0.0.1:9").unwrap();
        assert_eq!(
            storage(&base).resolve_latest(dir.path()).await,
            Some(dir.path().join("only.png"))
        );
    }
}
