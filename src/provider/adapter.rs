//! The per-provider adapter contract.

use async_trait::async_trait;
use url::Url;

use crate::client::AuthorizationRequest;
use crate::pkce::CODE_CHALLENGE_METHOD;

use super::errors::ProviderError;
use super::types::{Capability, HealthStatus, TokenResult, TokenSet, UserProfile};

/// Provider-specific implementation of the authorize/exchange/userinfo/
/// refresh/revoke contract. One instance per configured provider, built
/// by the registry; construction validates the provider's configuration.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn capabilities(&self) -> Vec<Capability>;

    /// Safe minimum requested when the caller supplies no scopes.
    fn default_scopes(&self) -> Vec<String>;

    fn supports_pkce(&self) -> bool {
        self.capabilities().contains(&Capability::Pkce)
    }

    /// Whether the provider issues OIDC ID tokens (and therefore accepts a
    /// `nonce` parameter).
    fn is_oidc(&self) -> bool {
        true
    }

    /// Deterministic composition of the provider's authorize endpoint for
    /// one login attempt.
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<Url, ProviderError>;

    /// Redeem an authorization code. Expected rejections (provider-side or
    /// transport) come back as `TokenResult::Failure`, never as a panic or
    /// error. The code is never cached.
    async fn exchange_code_for_tokens(&self, code: &str, pkce_verifier: Option<&str>)
    -> TokenResult;

    /// Fetch the normalized profile. Fails fast: a session cannot exist
    /// without a profile.
    async fn get_user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError>;

    /// Profile for a freshly issued token set. Default goes through the
    /// userinfo endpoint; providers that deliver identity inside the ID
    /// token (Apple, Azure B2C) override this.
    async fn profile_from_tokens(&self, tokens: &TokenSet) -> Result<UserProfile, ProviderError> {
        self.get_user_info(&tokens.access_token).await
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> TokenResult;

    /// Best-effort revocation of every supplied token. True only if every
    /// call succeeded; already-revoked tokens are not rolled back.
    async fn revoke_tokens(&self, tokens: &[String]) -> bool;

    async fn health_status(&self) -> HealthStatus;
}

/// Compose a standard OAuth2 authorize URL. Scopes are space-joined and
/// URL-encoded; PKCE and nonce parameters are appended only when present
/// on the request; custom parameters pass through last.
pub(crate) fn compose_authorize_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    default_scopes: &[String],
    request: &AuthorizationRequest,
) -> Result<Url, ProviderError> {
    let scopes = if request.scopes.is_empty() {
        default_scopes.join(" ")
    } else {
        request.scopes.join(" ")
    };

    let mut url = format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        endpoint,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes),
        urlencoding::encode(&request.state),
    );

    if let Some(pkce) = &request.pkce {
        url.push_str(&format!(
            "&code_challenge={}&code_challenge_method={}",
            urlencoding::encode(&pkce.challenge),
            CODE_CHALLENGE_METHOD
        ));
    }

    if let Some(nonce) = &request.nonce {
        url.push_str(&format!("&nonce={}", urlencoding::encode(nonce)));
    }

    for (key, value) in &request.extra_params {
        url.push_str(&format!(
            "&{}={}",
            urlencoding::encode(key),
            urlencoding::encode(value)
        ));
    }

    tracing::debug!("Composed authorize URL: {url}");
    Url::parse(&url).map_err(|e| ProviderError::Url(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AuthorizationRequest;
    use crate::pkce::PkcePair;
    use chrono::Utc;

    fn request(scopes: Vec<String>) -> AuthorizationRequest {
        AuthorizationRequest {
            provider: "google".to_string(),
            return_url: "https://app.example.com/home".to_string(),
            scopes,
            state: "state xyz".to_string(),
            pkce: Some(PkcePair {
                verifier: "v".repeat(43),
                challenge: "challenge+value".to_string(),
            }),
            nonce: Some("nonce123".to_string()),
            extra_params: vec![("hd".to_string(), "example.com".to_string())],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_compose_includes_all_standard_parameters() {
        let url = compose_authorize_url(
            "https://accounts.google.com/o/oauth2/v2/auth",
            "cid",
            "https://app.example.com/cb",
            &["openid".to_string()],
            &request(vec!["openid".to_string(), "email".to_string()]),
        )
        .unwrap();

        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert!(query.contains(&("response_type".to_string(), "code".to_string())));
        assert!(query.contains(&("client_id".to_string(), "cid".to_string())));
        assert!(query.contains(&("scope".to_string(), "openid email".to_string())));
        assert!(query.contains(&("state".to_string(), "state xyz".to_string())));
        assert!(query.contains(&("code_challenge_method".to_string(), "S256".to_string())));
        assert!(query.contains(&("nonce".to_string(), "nonce123".to_string())));
        assert!(query.contains(&("hd".to_string(), "example.com".to_string())));
    }

    #[test]
    fn test_compose_defaults_scopes_when_none_requested() {
        let url = compose_authorize_url(
            "https://accounts.google.com/o/oauth2/v2/auth",
            "cid",
            "https://app.example.com/cb",
            &["openid".to_string(), "profile".to_string(), "email".to_string()],
            &request(vec![]),
        )
        .unwrap();

        let scope = url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.to_string())
            .unwrap();
        assert_eq!(scope, "openid profile email");
    }

    #[test]
    fn test_compose_omits_pkce_and_nonce_when_absent() {
        let mut req = request(vec![]);
        req.pkce = None;
        req.nonce = None;
        let url = compose_authorize_url(
            "https://example.com/authorize",
            "cid",
            "https://app.example.com/cb",
            &["openid".to_string()],
            &req,
        )
        .unwrap();

        assert!(url.query_pairs().all(|(k, _)| k != "code_challenge"));
        assert!(url.query_pairs().all(|(k, _)| k != "nonce"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let req = request(vec!["openid".to_string()]);
        let a = compose_authorize_url(
            "https://example.com/authorize",
            "cid",
            "https://app.example.com/cb",
            &[],
            &req,
        )
        .unwrap();
        let b = compose_authorize_url(
            "https://example.com/authorize",
            "cid",
            "https://app.example.com/cb",
            &[],
            &req,
        )
        .unwrap();
        assert_eq!(a, b);
    }
}
