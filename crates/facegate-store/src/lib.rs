//! facegate-store — Persistence for enrolled face embeddings.
//!
//! One [`EmbeddingStore`] interface with two backends, a remote HTTP service
//! ([`RemoteStore`]) and a single JSON file ([`FileStore`]), chosen once at
//! startup through [`Backend`]. [`CachedStore`] wraps whichever backend is
//! active with a process-lifetime read-through / write-through cache.

pub mod cache;
pub mod error;
pub mod file;
pub mod remote;

use facegate_core::{Embedding, ProfileRecord};
use std::future::Future;
use std::str::FromStr;

pub use cache::CachedStore;
pub use error::StoreError;
pub use file::FileStore;
pub use remote::{RemoteConfig, RemoteStore};

/// Keyed storage of one embedding per user id.
pub trait EmbeddingStore: Send + Sync {
    /// Fetch the enrolled record. `Ok(None)` means the user is confirmed absent;
    /// any failure to find out is an `Err`.
    fn get(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ProfileRecord>, StoreError>> + Send;

    /// Store `embedding` for `user_id`, replacing any previous record.
    fn put(
        &self,
        user_id: &str,
        embedding: &Embedding,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Which backend holds the authoritative records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Remote backend service over HTTP.
    Database,
    /// Local JSON file.
    File,
}

impl FromStr for StorageMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "remote" => Ok(StorageMode::Database),
            "file" => Ok(StorageMode::File),
            other => Err(StoreError::UnknownMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Database => f.write_str("database"),
            StorageMode::File => f.write_str("file"),
        }
    }
}

/// The backend selected for this process.
pub enum Backend {
    Remote(RemoteStore),
    File(FileStore),
}

impl Backend {
    pub fn mode(&self) -> StorageMode {
        match self {
            Backend::Remote(_) => StorageMode::Database,
            Backend::File(_) => StorageMode::File,
        }
    }
}

impl EmbeddingStore for Backend {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        match self {
            Backend::Remote(s) => s.get(user_id).await,
            Backend::File(s) => s.get(user_id).await,
        }
    }

    async fn put(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        match self {
            Backend::Remote(s) => s.put(user_id, embedding).await,
            Backend::File(s) => s.put(user_id, embedding).await,
        }
    }
}
