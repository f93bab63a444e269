use chrono::Utc;

use crate::storage::StorageBackend;

use super::errors::SessionError;
use super::types::Session;

/// Fixed key the serialized session record lives under in the backing
/// storage. Absence of the key means no session; there is no schema
/// versioning beyond that.
pub(crate) const SESSION_STORAGE_KEY: &str = "oauth2_client.session";

/// Single source of truth for "am I authenticated". The session is written
/// as one serialized record, so readers observe either the old or the new
/// session in full, never a mix.
pub struct SessionStore {
    backend: Box<dyn StorageBackend>,
}

impl SessionStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Expiry-aware read. An expired or unreadable record counts as absent
    /// and is purged on the way out.
    pub async fn get(&self) -> Option<Session> {
        let raw = match self.backend.get(SESSION_STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Session read failed: {e}");
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable session record: {e}");
                let _ = self.backend.remove(SESSION_STORAGE_KEY).await;
                return None;
            }
        };

        if session.is_expired_at(Utc::now()) {
            tracing::debug!(session_id = %session.session_id, "Purging expired session");
            let _ = self.backend.remove(SESSION_STORAGE_KEY).await;
            return None;
        }

        Some(session)
    }

    /// Atomic replace of the whole record.
    pub async fn set(&self, session: &Session) -> Result<(), SessionError> {
        let serialized =
            serde_json::to_string(session).map_err(|e| SessionError::Serde(e.to_string()))?;
        self.backend
            .set(SESSION_STORAGE_KEY, serialized)
            .await
            .map_err(SessionError::from)
    }

    /// Idempotent removal of the session and its backing key.
    pub async fn clear(&self) {
        if let Err(e) = self.backend.remove(SESSION_STORAGE_KEY).await {
            tracing::error!("Session clear failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{TokenSet, UserProfile};
    use crate::storage::MemoryStorage;
    use chrono::Duration;

    fn store() -> SessionStore {
        SessionStore::new(Box::new(MemoryStorage::new()))
    }

    fn session(expires_in_secs: i64) -> Session {
        let user = UserProfile {
            id: "u1".to_string(),
            email: None,
            name: None,
            given_name: None,
            family_name: None,
            picture: None,
            provider: "google".to_string(),
            email_verified: false,
            locale: None,
            roles: vec![],
            permissions: vec![],
        };
        let mut s = Session::from_tokens(
            user,
            &TokenSet {
                access_token: "at".to_string(),
                refresh_token: None,
                id_token: None,
                token_type: "Bearer".to_string(),
                expires_in: 0,
                scope: None,
            },
            "google",
            Utc::now(),
        );
        s.expires_at = Utc::now() + Duration::seconds(expires_in_secs);
        s
    }

    #[tokio::test]
    async fn test_get_returns_stored_session() {
        let store = store();
        assert!(store.get().await.is_none());
        let s = session(3600);
        store.set(&s).await.unwrap();
        assert_eq!(store.get().await.unwrap().session_id, s.session_id);
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_absent_and_is_purged() {
        let store = store();
        store.set(&session(-10)).await.unwrap();
        assert!(store.get().await.is_none());
        // purge happened, not just filtering
        assert!(
            store
                .backend
                .get(SESSION_STORAGE_KEY)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_absent() {
        let store = store();
        store
            .backend
            .set(SESSION_STORAGE_KEY, "not json".to_string())
            .await
            .unwrap();
        assert!(store.get().await.is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_whole_record() {
        let store = store();
        let first = session(3600);
        let second = session(7200);
        store.set(&first).await.unwrap();
        store.set(&second).await.unwrap();
        assert_eq!(store.get().await.unwrap().session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = store();
        store.set(&session(3600)).await.unwrap();
        store.clear().await;
        store.clear().await;
        assert!(store.get().await.is_none());
    }
}
