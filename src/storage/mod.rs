//! Pluggable key/value backings for the session record.
//!
//! The contract is identical across backings; only how long a stored value
//! survives differs. Callers needing tab-scoped or cross-tab semantics
//! inject their own [`StorageBackend`].

mod errors;
mod file;
mod memory;

use async_trait::async_trait;

pub use errors::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Minimal key/value contract the session store writes through. A value is
/// always a single serialized record, so `set` is an atomic replace from
/// the reader's point of view.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
