//! UE5 Remote Control API client
//!
//! This module handles:
//! - Reachability probes against `/remote/info`
//! - Running Python through the PythonScriptLibrary object call
//! - Triggering high-resolution captures

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::script::capture_script;
use super::traits::{CaptureError, ExecutionError, TargetClient};

const PYTHON_LIBRARY_PATH: &str = "/Script/PythonScriptPlugin.Default__PythonScriptLibrary";
const PYTHON_FUNCTION: &str = "ExecutePythonCommand";

/// Body of `PUT /remote/object/call`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ObjectCall<'a> {
    object_path: &'a str,
    function_name: &'a str,
    parameters: PythonParameters<'a>,
}

#[derive(Debug, Serialize)]
struct PythonParameters<'a> {
    #[serde(rename = "PythonCommand")]
    python_command: &'a str,
}

/// Remote Control client timeouts
#[derive(Debug, Clone)]
pub struct RemoteControlConfig {
    pub probe_timeout: Duration,
    pub execute_timeout: Duration,
}

pub struct RemoteControlClient {
    http: Client,
    base: String,
    config: RemoteControlConfig,
}

impl RemoteControlClient {
    pub fn new(base_url: &Url, config: RemoteControlConfig) -> Result<Self, ExecutionError> {
        let http = Client::builder()
            .build()
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: base_url.as_str().trim_end_matches('/').to_string(),
            config,
        })
    }

    fn classify(&self, err: reqwest::Error) -> ExecutionError {
        if err.is_connect() {
            ExecutionError::NotConnected {
                endpoint: self.base.clone(),
                reason: err.to_string(),
            }
        } else if err.is_timeout() {
            ExecutionError::Transport(format!("timed out after {:?}", self.config.execute_timeout))
        } else {
            ExecutionError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl TargetClient for RemoteControlClient {
    async fn probe(&self) -> bool {
        let url = format!("{}/remote/info", self.base);
        match self
            .http
            .get(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", self.base, e);
                false
            }
        }
    }

    async fn execute(&self, code: &str) -> Result<String, ExecutionError> {
        let url = format!("{}/remote/object/call", self.base);
        let payload = ObjectCall {
            object_path: PYTHON_LIBRARY_PATH,
            function_name: PYTHON_FUNCTION,
            parameters: PythonParameters {
                python_command: code,
            },
        };

        let resp = self
            .http
            .put(url)
            .timeout(self.config.execute_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(e))?;
        if !status.is_success() {
            return Err(ExecutionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn trigger_capture(&self, destination: &Path) -> Result<PathBuf, CaptureError> {
        info!("Requesting capture to {}", destination.display());
        self.execute(&capture_script(destination)).await?;
        Ok(destination.to_path_buf())
    }

    fn endpoint(&self) -> &str {
        &self.base
    }
}
