use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::client::AuthorizationRequest;
use crate::config::GoogleSettings;

use super::adapter::{ProviderAdapter, compose_authorize_url};
use super::errors::ProviderError;
use super::http::OAuth2Http;
use super::types::{Capability, HealthStatus, TokenResult, UserProfile};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const GOOGLE_DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";

// The user data we get back from Google's OIDC userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    locale: Option<String>,
}

pub struct GoogleAdapter {
    name: String,
    settings: GoogleSettings,
    redirect_uri: String,
    http: OAuth2Http,
    // Endpoint overrides for tests; production uses the Google constants.
    token_url: String,
    userinfo_url: String,
}

impl GoogleAdapter {
    pub(crate) fn new(
        name: impl Into<String>,
        settings: GoogleSettings,
        redirect_uri: String,
        http: OAuth2Http,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            redirect_uri,
            http,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoints(mut self, token_url: String, userinfo_url: String) -> Self {
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Google"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::OAuth2,
            Capability::Pkce,
            Capability::Refresh,
            Capability::Revoke,
        ]
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
        let mut url = compose_authorize_url(
            GOOGLE_AUTH_URL,
            &self.settings.client_id,
            &self.redirect_uri,
            &self.default_scopes(),
            request,
        )?;
        {
            let mut pairs = url.query_pairs_mut();
            // offline access is what makes Google issue a refresh token
            pairs.append_pair("access_type", "offline");
            if let Some(hd) = &self.settings.hosted_domain {
                pairs.append_pair("hd", hd);
            }
            if let Some(prompt) = &self.settings.prompt {
                pairs.append_pair("prompt", prompt);
            }
        }
        Ok(url)
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
        self.http.token_request(&self.token_url, &params).await
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError> {
        let value = self
            .http
            .userinfo_json(&self.userinfo_url, access_token, &[])
            .await?;
        let info: GoogleUserInfo = serde_json::from_value(value)
            .map_err(|e| ProviderError::Serde(format!("Failed to deserialize userinfo: {e}")))?;
        Ok(UserProfile {
            id: info.sub,
            email: info.email,
            name: info.name,
            given_name: info.given_name,
            family_name: info.family_name,
            picture: info.picture,
            provider: self.name.clone(),
            email_verified: info.email_verified,
            locale: info.locale,
            roles: Vec::new(),
            permissions: Vec::new(),
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
        self.http.token_request(&self.token_url, &params).await
    }

    async fn revoke_tokens(&self, tokens: &[String]) -> bool {
        let mut all_ok = true;
        for token in tokens {
            if !self
                .http
                .revoke(GOOGLE_REVOKE_URL, &[("token", token.as_str())])
                .await
            {
                all_ok = false;
            }
        }
        all_ok
    }

    async fn health_status(&self) -> HealthStatus {
        self.http.probe(GOOGLE_DISCOVERY_URL).await
    }
}
