use thiserror::Error;

use crate::utils::UtilError;

#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Fetch user info error: {0}")]
    UserInfo(String),

    #[error("Serde error: {0}")]
    Serde(String),

    #[error("URL composition error: {0}")]
    Url(String),

    #[error("Id token error: {0}")]
    IdToken(String),

    /// Error from utils operations
    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}
