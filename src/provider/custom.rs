use async_trait::async_trait;
use url::Url;

use crate::client::AuthorizationRequest;
use crate::config::CustomSettings;

use super::adapter::{ProviderAdapter, compose_authorize_url};
use super::errors::ProviderError;
use super::http::OAuth2Http;
use super::types::{Capability, HealthStatus, TokenResult, UserProfile};

/// A fully endpoint-configured OAuth2/OIDC provider. This is the adapter
/// deployments use for Keycloak, Auth0, Okta and in-house identity servers,
/// and the only one whose userinfo claims can carry roles and permissions.
pub struct CustomAdapter {
    name: String,
    settings: CustomSettings,
    redirect_uri: String,
    http: OAuth2Http,
}

impl CustomAdapter {
    pub(crate) fn new(
        name: impl Into<String>,
        settings: CustomSettings,
        redirect_uri: String,
        http: OAuth2Http,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            redirect_uri,
            http,
        }
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) => {
            s.split_whitespace().map(str::to_string).collect()
        }
        _ => Vec::new(),
    }
}

#[async_trait]
impl ProviderAdapter for CustomAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.settings.display_name
    }

    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = vec![Capability::OAuth2, Capability::Refresh];
        if self.settings.supports_pkce {
            caps.push(Capability::Pkce);
        }
        if self.settings.revoke_url.is_some() {
            caps.push(Capability::Revoke);
        }
        caps
    }

    fn default_scopes(&self) -> Vec<String> {
        if self.settings.scopes.is_empty() {
            vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ]
        } else {
            self.settings.scopes.clone()
        }
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<Url, ProviderError> {
        compose_authorize_url(
            &self.settings.authorize_url,
            &self.settings.client_id,
            &self.redirect_uri,
            &self.default_scopes(),
            request,
        )
    }

    async fn exchange_code_for_tokens(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> TokenResult {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(secret) = &self.settings.client_secret {
            params.push(("client_secret", secret));
        }
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier));
        }
        self.http
            .token_request(&self.settings.token_url, &params)
            .await
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError> {
        let claims = self
            .http
            .userinfo_json(&self.settings.userinfo_url, access_token, &[])
            .await?;

        let id = claims
            .get("sub")
            .or_else(|| claims.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProviderError::Serde("Userinfo response carried no 'sub' or 'id' claim".to_string())
            })?
            .to_string();

        let get_str =
            |key: &str| claims.get(key).and_then(|v| v.as_str()).map(str::to_string);

        let roles = string_list(
            self.settings
                .roles_claim
                .as_deref()
                .and_then(|claim| claims.get(claim)),
        );
        let permissions = string_list(
            self.settings
                .permissions_claim
                .as_deref()
                .and_then(|claim| claims.get(claim)),
        );

        Ok(UserProfile {
            id,
            email: get_str("email"),
            name: get_str("name"),
            given_name: get_str("given_name"),
            family_name: get_str("family_name"),
            picture: get_str("picture"),
            provider: self.name.clone(),
            email_verified: claims
                .get("email_verified")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            locale: get_str("locale"),
            roles,
            permissions,
        })
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> TokenResult {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
        ];
        if let Some(secret) = &self.settings.client_secret {
            params.push(("client_secret", secret));
        }
        self.http
            .token_request(&self.settings.token_url, &params)
            .await
    }

    async fn revoke_tokens(&self, tokens: &[String]) -> bool {
        let Some(revoke_url) = &self.settings.revoke_url else {
            tracing::debug!("Provider '{}' has no revocation endpoint", self.name);
            return tokens.is_empty();
        };
        let mut all_ok = true;
        for token in tokens {
            let mut params = vec![
                ("token", token.as_str()),
                ("client_id", self.settings.client_id.as_str()),
            ];
            if let Some(secret) = &self.settings.client_secret {
                params.push(("client_secret", secret));
            }
            if !self.http.revoke(revoke_url, &params).await {
                all_ok = false;
            }
        }
        all_ok
    }

    async fn health_status(&self) -> HealthStatus {
        let url = self
            .settings
            .health_url
            .as_deref()
            .unwrap_or(&self.settings.authorize_url);
        self.http.probe(url).await
    }
}
