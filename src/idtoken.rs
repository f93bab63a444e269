//! Structural decode of OIDC ID tokens.
//!
//! The engine never verifies token signatures (that is the provider's and
//! the backend's job); it only needs the payload claims, primarily for
//! providers such as Apple that return the user's identity inside the ID
//! token instead of exposing a userinfo endpoint.

use serde::Deserialize;
use thiserror::Error;

use crate::utils::base64url_decode;

#[derive(Debug, Error, Clone)]
pub enum IdTokenError {
    #[error("Invalid token format: {0}")]
    Format(String),

    #[error("Payload decode error: {0}")]
    Decode(String),
}

/// Claims the engine cares about. Everything else in the payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: serde_json::Value,
    pub exp: i64,
    pub iat: i64,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
    pub locale: Option<String>,
    pub nonce: Option<String>,
}

/// Split a compact JWT and deserialize its payload segment. No signature
/// check is performed.
pub fn decode_id_token(token: &str) -> Result<IdTokenClaims, IdTokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(IdTokenError::Format(
            "Expected three dot-separated segments".to_string(),
        ));
    };

    let payload_bytes =
        base64url_decode(payload).map_err(|e| IdTokenError::Decode(e.to_string()))?;
    serde_json::from_slice(&payload_bytes).map_err(|e| IdTokenError::Decode(e.to_string()))
}
