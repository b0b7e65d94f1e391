#![allow(clippy::result_large_err)]

use super::protocol::{ExecutionRequest, HealthResponse, StateResponse};
use crate::core::config::BridgeClientConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::executor::{ExecutionResult, ScriptBackend};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Failures talking to a bridge server.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bridge unreachable: {0}")]
    Network(String),

    #[error("Bridge error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Bridge returned a malformed response: {0}")]
    Decode(String),
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        let code = match err {
            BridgeError::Network(_) => "RB-BRIDGE-010",
            BridgeError::Status { .. } => "RB-BRIDGE-011",
            BridgeError::Decode(_) => "RB-BRIDGE-012",
        };
        let mut app = AppError::new(ErrorCategory::TransportFailure, err.to_string()).with_code(code);
        if let BridgeError::Status { status, .. } = &err {
            app.add_context("status", &status.to_string());
        }
        app
    }
}

/// Client for a remote bridge server. A drop-in [`ScriptBackend`].
#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: Url,
    token: String,
    client: reqwest::Client,
}

impl BridgeClient {
    /// `timeout` bounds the network wait only; the remote script keeps running past it.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("invalid bridge URL {}: {}", base_url, err),
            )
            .with_code("RB-CFG-004")
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::InternalError,
                    format!("failed to build HTTP client: {}", err),
                )
            })?;
        Ok(Self {
            base_url,
            token: token.into(),
            client,
        })
    }

    pub fn from_config(config: &BridgeClientConfig) -> Result<Self, AppError> {
        let url = config.url.as_deref().unwrap_or_default().trim();
        Self::new(
            url,
            config.token.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST /execute`.
    pub async fn execute_code(
        &self,
        code: &str,
        description: Option<&str>,
    ) -> Result<ExecutionResult, BridgeError> {
        let request = ExecutionRequest {
            code: code.to_string(),
            description: description.map(str::to_string),
        };
        self.post_json("execute", &request).await
    }

    /// `POST /state`; returns the snapshot text as sent by the server.
    pub async fn state(&self) -> Result<String, BridgeError> {
        let response: StateResponse = self.post_json("state", &serde_json::json!({})).await?;
        Ok(response.state)
    }

    /// `GET /health`; no token is sent.
    pub async fn health(&self) -> Result<bool, BridgeError> {
        let response = self
            .client
            .get(self.endpoint("health")?)
            .send()
            .await
            .map_err(|e| BridgeError::Network(e.to_string()))?;
        let health: HealthResponse = Self::decode(response).await?;
        Ok(health.ok)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, BridgeError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| BridgeError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BridgeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| BridgeError::Decode(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, BridgeError> {
        // Url::join drops the last segment unless the base ends with '/'.
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|e| BridgeError::Network(format!("invalid endpoint {}: {}", path, e)))
    }
}

#[async_trait]
impl ScriptBackend for BridgeClient {
    async fn execute(&self, code: &str) -> Result<ExecutionResult, AppError> {
        Ok(self.execute_code(code, None).await?)
    }

    async fn snapshot(&self) -> Result<String, AppError> {
        Ok(self.state().await?)
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

/// True when a bridged call was refused for a missing or wrong token.
pub fn is_auth_failure(err: &AppError) -> bool {
    let unauthorized = StatusCode::UNAUTHORIZED.as_u16().to_string();
    err.category == ErrorCategory::TransportFailure
        && err.context.get("status") == Some(&unauthorized)
}
