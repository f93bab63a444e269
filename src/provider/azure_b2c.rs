use async_trait::async_trait;
use url::Url;

use crate::client::AuthorizationRequest;
use crate::config::AzureB2cSettings;
use crate::idtoken::decode_id_token;

use super::adapter::{ProviderAdapter, compose_authorize_url};
use super::errors::ProviderError;
use super::http::OAuth2Http;
use super::types::{Capability, HealthStatus, TokenResult, TokenSet, UserProfile};

/// Azure AD B2C user flows. Endpoints are templated from the tenant and
/// policy names; like Apple, identity claims travel in the ID token rather
/// than through a userinfo endpoint.
pub struct AzureB2cAdapter {
    name: String,
    settings: AzureB2cSettings,
    redirect_uri: String,
    http: OAuth2Http,
    base_url: String,
}

impl AzureB2cAdapter {
    pub(crate) fn new(
        name: impl Into<String>,
        settings: AzureB2cSettings,
        redirect_uri: String,
        http: OAuth2Http,
    ) -> Self {
        let base_url = format!(
            "https://{tenant}.b2clogin.com/{tenant}.onmicrosoft.com/{policy}",
            tenant = settings.tenant,
            policy = settings.policy,
        );
        Self {
            name: name.into(),
            settings,
            redirect_uri,
            http,
            base_url,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl ProviderAdapter for AzureB2cAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Azure AD B2C"
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::OAuth2, Capability::Pkce, Capability::Refresh]
    }

    fn default_scopes(&self) -> Vec<String> {
        if self.settings.scopes.is_empty() {
            // offline_access is what makes B2C return a refresh token;
            // the client id as scope yields an access token for the app itself.
            vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "offline_access".to_string(),
                self.settings.client_id.clone(),
            ]
        } else {
            self.settings.scopes.clone()
        }
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<Url, ProviderError> {
        compose_authorize_url(
            &format!("{}/oauth2/v2.0/authorize", self.base_url),
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
        let token_url = format!("{}/oauth2/v2.0/token", self.base_url);
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier));
        }
        self.http.token_request(&token_url, &params).await
    }

    async fn get_user_info(&self, _access_token: &str) -> Result<UserProfile, ProviderError> {
        Err(ProviderError::UserInfo(
            "Azure B2C user flows do not expose a userinfo endpoint; claims travel in the ID token"
                .to_string(),
        ))
    }

    async fn profile_from_tokens(&self, tokens: &TokenSet) -> Result<UserProfile, ProviderError> {
        let id_token = tokens.id_token.as_deref().ok_or_else(|| {
            ProviderError::IdToken("B2C token response carried no ID token".to_string())
        })?;
        let claims = decode_id_token(id_token).map_err(|e| ProviderError::IdToken(e.to_string()))?;
        Ok(UserProfile {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            given_name: claims.given_name,
            family_name: claims.family_name,
            picture: claims.picture,
            provider: self.name.clone(),
            email_verified: claims.email_verified.unwrap_or(false),
            locale: claims.locale,
            roles: Vec::new(),
            permissions: Vec::new(),
        })
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> TokenResult {
        let token_url = format!("{}/oauth2/v2.0/token", self.base_url);
        let params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
        ];
        self.http.token_request(&token_url, &params).await
    }

    async fn revoke_tokens(&self, tokens: &[String]) -> bool {
        // B2C user flows have no revocation endpoint; tokens expire on
        // their own. An empty revocation set is vacuously successful.
        if !tokens.is_empty() {
            tracing::debug!("Azure B2C has no revocation endpoint; skipping");
        }
        tokens.is_empty()
    }

    async fn health_status(&self) -> HealthStatus {
        self.http
            .probe(&format!(
                "{}/v2.0/.well-known/openid-configuration",
                self.base_url
            ))
            .await
    }
}
