use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::{TokenSet, UserProfile};

/// The authenticated unit of truth. A `Session` is either fully valid or
/// does not exist; partially populated sessions are never surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub provider: String,
}

impl Session {
    pub(crate) fn from_tokens(
        user: UserProfile,
        tokens: &TokenSet,
        provider: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            id_token: tokens.id_token.clone(),
            token_type: tokens.token_type.clone(),
            expires_at: tokens.expires_at(now),
            provider: provider.into(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Apply a successful refresh: access token and expiry are replaced,
    /// the refresh token only when the provider rotated it, the profile
    /// wholesale when updated claims arrived.
    pub(crate) fn apply_refresh(
        &mut self,
        tokens: &TokenSet,
        user: Option<UserProfile>,
        now: DateTime<Utc>,
    ) {
        self.access_token = tokens.access_token.clone();
        self.expires_at = tokens.expires_at(now);
        self.token_type = tokens.token_type.clone();
        if tokens.refresh_token.is_some() {
            self.refresh_token = tokens.refresh_token.clone();
        }
        if tokens.id_token.is_some() {
            self.id_token = tokens.id_token.clone();
        }
        if let Some(user) = user {
            self.user = user;
        }
    }
}
