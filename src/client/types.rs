use chrono::{DateTime, Utc};
use url::Url;

use crate::pkce::PkcePair;
use crate::provider::{TokenSet, UserProfile};
use crate::session::Session;

/// Caller input to `initiate_login`.
#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    /// Provider name; falls back to the configured default.
    pub provider: Option<String>,
    /// Absolute URL the application wants to land on after login.
    pub return_url: String,
    /// Requested scopes; empty means the provider's safe minimum.
    pub scopes: Vec<String>,
    /// Pass-through provider parameters (`prompt`, `login_hint`, ...).
    pub extra_params: Vec<(String, String)>,
}

/// One pending login attempt, keyed by its `state` value. Created at
/// `initiate_login`, consumed (single use) by the matching callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub provider: String,
    pub return_url: String,
    pub scopes: Vec<String>,
    pub state: String,
    pub pkce: Option<PkcePair>,
    pub nonce: Option<String>,
    pub extra_params: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

/// What `initiate_login` hands back: the URL to navigate the browser to
/// and the state value that ties the round trip together.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    pub auth_url: Url,
    pub state: String,
}

/// Parameters the provider redirect delivered back to us.
#[derive(Debug, Clone, Default)]
pub struct CallbackData {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a successful callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub session: Session,
    pub user: UserProfile,
    pub tokens: TokenSet,
}
