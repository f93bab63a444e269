use async_trait::async_trait;
use url::Url;

use crate::client::AuthorizationRequest;
use crate::config::AppleSettings;
use crate::idtoken::decode_id_token;

use super::adapter::{ProviderAdapter, compose_authorize_url};
use super::errors::ProviderError;
use super::http::OAuth2Http;
use super::types::{Capability, HealthStatus, TokenResult, TokenSet, UserProfile};

const APPLE_AUTH_URL: &str = "https://appleid.apple.com/auth/authorize";
const APPLE_TOKEN_URL: &str = "https://appleid.apple.com/auth/token";
const APPLE_REVOKE_URL: &str = "https://appleid.apple.com/auth/revoke";
const APPLE_DISCOVERY_URL: &str = "https://appleid.apple.com/.well-known/openid-configuration";

/// Sign in with Apple. Apple has no userinfo endpoint; the user's identity
/// arrives inside the ID token, so the profile is taken from its
/// structurally decoded claims.
pub struct AppleAdapter {
    name: String,
    settings: AppleSettings,
    redirect_uri: String,
    http: OAuth2Http,
    token_url: String,
}

impl AppleAdapter {
    pub(crate) fn new(
        name: impl Into<String>,
        settings: AppleSettings,
        redirect_uri: String,
        http: OAuth2Http,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            redirect_uri,
            http,
            token_url: APPLE_TOKEN_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_token_url(mut self, token_url: String) -> Self {
        self.token_url = token_url;
        self
    }
}

#[async_trait]
impl ProviderAdapter for AppleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        "Apple"
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
            vec!["name".to_string(), "email".to_string()]
        } else {
            self.settings.scopes.clone()
        }
    }

    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<Url, ProviderError> {
        let mut url = compose_authorize_url(
            APPLE_AUTH_URL,
            &self.settings.client_id,
            &self.redirect_uri,
            &self.default_scopes(),
            request,
        )?;
        // Apple requires form_post whenever name or email scopes are asked for.
        url.query_pairs_mut()
            .append_pair("response_mode", "form_post");
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
        if let Some(verifier) = pkce_verifier {
            params.push(("code_verifier", verifier));
        }
        self.http.token_request(&self.token_url, &params).await
    }

    async fn get_user_info(&self, _access_token: &str) -> Result<UserProfile, ProviderError> {
        Err(ProviderError::UserInfo(
            "Apple does not expose a userinfo endpoint; the profile is carried in the ID token"
                .to_string(),
        ))
    }

    async fn profile_from_tokens(&self, tokens: &TokenSet) -> Result<UserProfile, ProviderError> {
        let id_token = tokens.id_token.as_deref().ok_or_else(|| {
            ProviderError::IdToken("Apple token response carried no ID token".to_string())
        })?;
        let claims = decode_id_token(id_token).map_err(|e| ProviderError::IdToken(e.to_string()))?;
        Ok(UserProfile {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            given_name: claims.given_name,
            family_name: claims.family_name,
            picture: None,
            provider: self.name.clone(),
            email_verified: claims.email_verified.unwrap_or(false),
            locale: claims.locale,
            roles: Vec::new(),
            permissions: Vec::new(),
        })
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> TokenResult {
        let params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
        ];
        self.http.token_request(&self.token_url, &params).await
    }

    async fn revoke_tokens(&self, tokens: &[String]) -> bool {
        let mut all_ok = true;
        for token in tokens {
            if !self
                .http
                .revoke(
                    APPLE_REVOKE_URL,
                    &[
                        ("client_id", self.settings.client_id.as_str()),
                        ("token", token.as_str()),
                    ],
                )
                .await
            {
                all_ok = false;
            }
        }
        all_ok
    }

    async fn health_status(&self) -> HealthStatus {
        self.http.probe(APPLE_DISCOVERY_URL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> AppleSettings {
        AppleSettings {
            client_id: "com.example.app".to_string(),
            team_id: Some("TEAM123".to_string()),
            scopes: vec![],
            enabled: true,
        }
    }

    fn apple_id_token(sub: &str, email: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            json!({
                "iss": "https://appleid.apple.com",
                "sub": sub,
                "aud": "com.example.app",
                "exp": 4102444800i64,
                "iat": 1735686000,
                "email": email,
                "email_verified": true
            })
            .to_string(),
        );
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn test_authorization_url_forces_form_post() {
        let adapter = AppleAdapter::new(
            "apple",
            settings(),
            "https://app.example.com/cb".to_string(),
            OAuth2Http::new(5),
        );
        let request = AuthorizationRequest {
            provider: "apple".to_string(),
            return_url: "https://app.example.com/home".to_string(),
            scopes: vec![],
            state: "st".to_string(),
            pkce: None,
            nonce: Some("n".to_string()),
            extra_params: vec![],
            created_at: Utc::now(),
        };
        let url = adapter.authorization_url(&request).unwrap();
        assert!(url.as_str().starts_with(APPLE_AUTH_URL));
        assert!(
            url.query_pairs()
                .any(|(k, v)| k == "response_mode" && v == "form_post")
        );
        assert!(url.query_pairs().any(|(k, v)| k == "scope" && v == "name email"));
    }

    #[tokio::test]
    async fn test_profile_comes_from_id_token() {
        let adapter = AppleAdapter::new(
            "apple",
            settings(),
            "https://app.example.com/cb".to_string(),
            OAuth2Http::new(5),
        );
        let tokens = TokenSet {
            access_token: "at".to_string(),
            refresh_token: None,
            id_token: Some(apple_id_token("001234.abcd", "user@example.com")),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: None,
        };
        let profile = adapter.profile_from_tokens(&tokens).await.unwrap();
        assert_eq!(profile.id, "001234.abcd");
        assert_eq!(profile.email.as_deref(), Some("user@example.com"));
        assert_eq!(profile.provider, "apple");
        assert!(profile.email_verified);
    }

    #[tokio::test]
    async fn test_profile_fails_without_id_token() {
        let adapter = AppleAdapter::new(
            "apple",
            settings(),
            "https://app.example.com/cb".to_string(),
            OAuth2Http::new(5),
        );
        let tokens = TokenSet {
            access_token: "at".to_string(),
            refresh_token: None,
            id_token: None,
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: None,
        };
        let result = adapter.profile_from_tokens(&tokens).await;
        assert!(matches!(result, Err(ProviderError::IdToken(_))));
    }

    #[tokio::test]
    async fn test_userinfo_endpoint_is_rejected() {
        let adapter = AppleAdapter::new(
            "apple",
            settings(),
            "https://app.example.com/cb".to_string(),
            OAuth2Http::new(5),
        );
        assert!(matches!(
            adapter.get_user_info("at").await,
            Err(ProviderError::UserInfo(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_posts_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("client_id=com.example.app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at",
                "token_type": "Bearer",
                "expires_in": 3600,
                "id_token": apple_id_token("001234.abcd", "user@example.com")
            })))
            .mount(&server)
            .await;

        let adapter = AppleAdapter::new(
            "apple",
            settings(),
            "https://app.example.com/cb".to_string(),
            OAuth2Http::new(5),
        )
        .with_token_url(format!("{}/token", server.uri()));

        let result = adapter.exchange_code_for_tokens("code", None).await;
        assert!(result.is_success());
    }
}
