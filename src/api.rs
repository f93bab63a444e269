//! Backend collaborator client.
//!
//! Non-OAuth deployments talk to a same-origin (or configured) API that
//! exposes session check/refresh/logout endpoints. The engine parses its
//! response envelope but does not define it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serde error: {0}")]
    Serde(String),

    #[error("API error: {0}")]
    Api(String),
}

/// The backend's response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "correlationId")]
    pub correlation_id: Option<String>,
}

pub(crate) struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub(crate) fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn parse_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Serde(e.to_string()))
    }

    /// Best-effort server-side logout. Returns whether the backend
    /// acknowledged it; the caller's local state is cleared regardless.
    pub(crate) async fn logout(&self, access_token: &str) -> bool {
        let result = self
            .client
            .post(format!("{}/auth/logout", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await;
        match result {
            Ok(response) => match Self::parse_envelope::<serde_json::Value>(response).await {
                Ok(envelope) => {
                    if !envelope.success {
                        tracing::debug!(
                            correlation_id = ?envelope.correlation_id,
                            "Backend logout reported failure: {:?}",
                            envelope.error
                        );
                    }
                    envelope.success
                }
                Err(e) => {
                    tracing::debug!("Backend logout envelope unreadable: {e}");
                    false
                }
            },
            Err(e) => {
                tracing::debug!("Backend logout transport failure: {e}");
                false
            }
        }
    }

    /// Ask the backend whether it still considers the session valid.
    pub(crate) async fn check_session(&self, access_token: &str) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(format!("{}/auth/session", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let envelope: ApiEnvelope<serde_json::Value> = Self::parse_envelope(response).await?;
        Ok(envelope.success)
    }
}
