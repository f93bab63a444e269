use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StorageBackend, StorageError};

/// Process-memory backing. Used for both the session-scoped and in-memory
/// storage modes; in a single process their lifetimes coincide.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        tracing::debug!("Creating in-memory session storage");
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);

        storage.set("k", "v1".to_string()).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Some("v1".to_string()));

        storage.set("k", "v2".to_string()).await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Some("v2".to_string()));

        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);

        // remove is idempotent
        storage.remove("k").await.unwrap();
    }
}
