use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized identity, mapped from provider-specific claims by the
/// issuing adapter. Immutable once attached to a session; replaced
/// wholesale when a refresh returns updated claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub provider: String,
    pub email_verified: bool,
    pub locale: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Tokens issued by a successful exchange or refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: String,
    /// Lifetime in seconds as reported by the provider.
    pub expires_in: u64,
    pub scope: Option<String>,
}

/// Ceiling applied to provider-reported token lifetimes (10 years).
/// Anything above this is not a lifetime a provider plausibly issued, and
/// unbounded values would overflow the expiry arithmetic.
const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl TokenSet {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lifetime = self.expires_in.min(MAX_TOKEN_LIFETIME_SECS);
        now + chrono::Duration::seconds(lifetime as i64)
    }
}

/// Whether a failed token call was rejected by the provider or never
/// reached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider answered with an OAuth error (non-success status).
    Provider,
    /// The request failed at the transport layer.
    Transport,
}

/// A provider-side or transport-level rejection of a token call. Expected
/// failure mode, carried as a value rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFailure {
    /// OAuth error code (`invalid_grant`, ...) or a transport marker.
    pub error: String,
    pub description: Option<String>,
    pub kind: FailureKind,
}

impl TokenFailure {
    pub fn provider(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: error.into(),
            description,
            kind: FailureKind::Provider,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            error: "transport_error".to_string(),
            description: Some(message.into()),
            kind: FailureKind::Transport,
        }
    }
}

impl std::fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{}: {desc}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Outcome of a token exchange or refresh. Provider rejections and
/// transport failures are values here, never panics or thrown errors.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenResult {
    Success(TokenSet),
    Failure(TokenFailure),
}

impl TokenResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Wire shape of a token endpoint response.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct RawTokenResponse {
    pub(crate) access_token: String,
    #[serde(default = "default_token_type")]
    pub(crate) token_type: String,
    #[serde(default = "default_expires_in")]
    pub(crate) expires_in: u64,
    pub(crate) refresh_token: Option<String>,
    pub(crate) id_token: Option<String>,
    pub(crate) scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

fn default_expires_in() -> u64 {
    3600
}

impl From<RawTokenResponse> for TokenSet {
    fn from(raw: RawTokenResponse) -> Self {
        Self {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            id_token: raw.id_token,
            token_type: raw.token_type,
            expires_in: raw.expires_in,
            scope: raw.scope,
        }
    }
}

/// Wire shape of an OAuth error body.
#[derive(Debug, Deserialize)]
pub(crate) struct RawErrorResponse {
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

/// What a provider adapter can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    OAuth2,
    Pkce,
    Refresh,
    Revoke,
}

/// Static descriptor of a configured provider, as reported by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub display_name: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
}

/// Result of a health probe against the provider's discovery endpoint.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub response_time: std::time::Duration,
    pub error: Option<String>,
}
