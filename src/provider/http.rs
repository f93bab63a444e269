//! HTTP plumbing shared by all provider adapters: the token-endpoint form
//! POST, the bearer userinfo GET, per-token revocation and the health probe.

use std::time::{Duration, Instant};

use super::errors::ProviderError;
use super::types::{HealthStatus, RawErrorResponse, RawTokenResponse, TokenFailure, TokenResult};

#[derive(Clone)]
pub(crate) struct OAuth2Http {
    client: reqwest::Client,
}

impl OAuth2Http {
    pub(crate) fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// POST a form-encoded grant request and map the response into a
    /// [`TokenResult`]. Provider rejections and transport failures both
    /// come back as `Failure` values; this call never errors.
    pub(crate) async fn token_request(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
    ) -> TokenResult {
        let response = match self.client.post(token_url).form(params).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Token request transport failure: {e}");
                return TokenResult::Failure(TokenFailure::transport(e.to_string()));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return TokenResult::Failure(TokenFailure::transport(e.to_string())),
        };

        if !status.is_success() {
            tracing::debug!("Token endpoint rejected request ({status}): {body}");
            let parsed: RawErrorResponse = serde_json::from_str(&body).unwrap_or(RawErrorResponse {
                error: None,
                error_description: None,
            });
            return TokenResult::Failure(TokenFailure::provider(
                parsed.error.unwrap_or_else(|| status.as_u16().to_string()),
                parsed.error_description,
            ));
        }

        match serde_json::from_str::<RawTokenResponse>(&body) {
            Ok(raw) => TokenResult::Success(raw.into()),
            Err(e) => {
                tracing::error!("Malformed token response body: {e}");
                TokenResult::Failure(TokenFailure::provider(
                    "invalid_response",
                    Some(format!("Failed to parse token response: {e}")),
                ))
            }
        }
    }

    /// Bearer GET against a userinfo endpoint. Unlike the token call this
    /// surfaces failures as errors: a session cannot exist without a profile.
    pub(crate) async fn userinfo_json(
        &self,
        userinfo_url: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .client
            .get(userinfo_url)
            .query(query)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ProviderError::UserInfo(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::UserInfo(e.to_string()))?;

        if !status.is_success() {
            tracing::error!("Userinfo endpoint returned {status}: {body}");
            return Err(ProviderError::UserInfo(format!(
                "Userinfo request failed with status {status}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Serde(format!("Failed to deserialize userinfo: {e}")))
    }

    /// One best-effort revocation POST. Returns whether the provider
    /// acknowledged it.
    pub(crate) async fn revoke(&self, revoke_url: &str, params: &[(&str, &str)]) -> bool {
        match self.client.post(revoke_url).form(params).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::debug!("Revocation rejected with status {}", response.status());
                }
                ok
            }
            Err(e) => {
                tracing::debug!("Revocation transport failure: {e}");
                false
            }
        }
    }

    /// Single round-trip probe against a configuration/discovery endpoint.
    pub(crate) async fn probe(&self, health_url: &str) -> HealthStatus {
        let started = Instant::now();
        match self.client.get(health_url).send().await {
            Ok(response) => {
                let response_time = started.elapsed();
                let status = response.status();
                HealthStatus {
                    is_healthy: status.is_success(),
                    response_time,
                    error: (!status.is_success()).then(|| format!("status {status}")),
                }
            }
            Err(e) => HealthStatus {
                is_healthy: false,
                response_time: started.elapsed(),
                error: Some(e.to_string()),
            },
        }
    }
}
