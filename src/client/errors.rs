use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::provider::{ProviderError, TokenFailure};
use crate::session::SessionError;
use crate::utils::UtilError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid return URL: {0}")]
    InvalidReturnUrl(String),

    #[error("Provider not available: {0}")]
    ProviderUnavailable(String),

    /// The callback carried a state we never issued, or one that was
    /// already redeemed. Treated as a possible CSRF attempt.
    #[error("Invalid or expired state parameter")]
    InvalidState,

    /// The provider redirected back with an `error` parameter instead of
    /// an authorization code. The description is passed through verbatim.
    #[error("{}", description.as_deref().unwrap_or(error.as_str()))]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// Token endpoint rejected the exchange or refresh. Carries the
    /// adapter's failure result unchanged.
    #[error("Token request failed: {0}")]
    TokenExchange(TokenFailure),

    #[error("ID token nonce mismatch")]
    NonceMismatch,

    #[error("No active session")]
    NotAuthenticated,

    /// A sign-out landed while this login was completing; its result was
    /// discarded rather than re-authenticating the user.
    #[error("Login cancelled by a concurrent sign-out")]
    Cancelled,

    #[error("Session has no refresh token")]
    NoRefreshToken,

    #[error("A refresh is already in progress")]
    RefreshInFlight,

    #[error(transparent)]
    Adapter(#[from] ProviderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Utils(#[from] UtilError),
}
