use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::client::AuthorizationRequest;
use crate::config::FacebookSettings;

use super::adapter::{ProviderAdapter, compose_authorize_url};
use super::errors::ProviderError;
use super::http::OAuth2Http;
use super::types::{Capability, HealthStatus, TokenFailure, TokenResult, UserProfile};

const FACEBOOK_DISCOVERY_URL: &str = "https://www.facebook.com/.well-known/openid-configuration";

#[derive(Debug, Clone, Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FacebookPicture {
    data: Option<FacebookPictureData>,
}

#[derive(Debug, Clone, Deserialize)]
struct FacebookUserInfo {
    id: String,
    name: Option<String>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    picture: Option<FacebookPicture>,
}

/// Facebook Login over the Graph API. Facebook issues long-lived tokens
/// instead of standard OAuth refresh tokens, so the capability set omits
/// `Refresh`.
pub struct FacebookAdapter {
    name: String,
    settings: FacebookSettings,
    redirect_uri: String,
    http: OAuth2Http,
    graph_base: String,
}

impl FacebookAdapter {
    pub(crate) fn new(
        name: impl Into<String>,
        settings: FacebookSettings,
        redirect_uri: String,
        http: OAuth2Http,
    ) -> Self {
        let graph_base = format!("https://graph.facebook.com/{}", settings.graph_version);
        Self {
            name: name.into(),
            settings,
            redirect_uri,
            http,
            graph_base,
        }
    }

    #[cfg(test)]
    fn with_graph_base(mut self, graph_base: String) -> Self {
        self.graph_base = graph_base;
        self
    }

    fn dialog_url(&self) -> String {
        format!(
            "https://www.facebook.com/{}/dialog/oauth",
            self.settings.graph_version
        )
    }
}

#[async_trait]
impl ProviderAdapter for FacebookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Facebook"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::OAuth2, Capability::Pkce, Capability::Revoke]
    }

    fn default_scopes(&self) -> Vec<String> {
        if self.settings.scopes.is_empty() {
            vec!["public_profile".to_string(), "email".to_string()]
        } else {
            self.settings.scopes.clone()
        }
    }

    fn is_oidc(&self) -> bool {
        false
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<Url, ProviderError> {
        compose_authorize_url(
            &self.dialog_url(),
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
        let token_url = format!("{}/oauth/access_token", self.graph_base);
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
        self.http.token_request(&token_url, &params).await
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError> {
        let value = self
            .http
            .userinfo_json(
                &format!("{}/me", self.graph_base),
                access_token,
                &[("fields", "id,name,email,first_name,last_name,picture")],
            )
            .await?;
        let info: FacebookUserInfo = serde_json::from_value(value)
            .map_err(|e| ProviderError::Serde(format!("Failed to deserialize userinfo: {e}")))?;
        Ok(UserProfile {
            id: info.id,
            // Facebook only returns verified email addresses
            email_verified: info.email.is_some(),
            email: info.email,
            name: info.name,
            given_name: info.first_name,
            family_name: info.last_name,
            picture: info.picture.and_then(|p| p.data).and_then(|d| d.url),
            provider: self.name.clone(),
            locale: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        })
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> TokenResult {
        TokenResult::Failure(TokenFailure::provider(
            "unsupported_grant_type",
            Some("Facebook does not issue refresh tokens".to_string()),
        ))
    }

    async fn revoke_tokens(&self, tokens: &[String]) -> bool {
        let revoke_url = format!("{}/me/permissions/delete", self.graph_base);
        let mut all_ok = true;
        for token in tokens {
            if !self
                .http
                .revoke(&revoke_url, &[("access_token", token.as_str())])
                .await
            {
                all_ok = false;
            }
        }
        all_ok
    }

    async fn health_status(&self) -> HealthStatus {
        self.http.probe(FACEBOOK_DISCOVERY_URL).await
    }
}
