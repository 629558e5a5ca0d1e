//! Process-lifetime embedding cache layered over any [`EmbeddingStore`].
//!
//! Reads hit the map first and fall through to the backend on a miss;
//! successful backend reads are inserted. Writes go to the backend first and
//! are mirrored into the map only once the backend confirms them. Entries are
//! never evicted.
//!
//! Consistency: the lock is held only for a single map lookup or insert,
//! never across a backend call. Concurrent requests for the same user are not
//! serialized; a read racing an enrollment may see either the old or the new
//! record, and of two racing enrollments the last to finish wins.

use crate::error::StoreError;
use crate::EmbeddingStore;
use facegate_core::{Embedding, ProfileRecord};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub struct CachedStore<S> {
    inner: S,
    entries: RwLock<HashMap<String, ProfileRecord>>,
}

impl<S: EmbeddingStore> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached records.
    pub fn cached_len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether `user_id` is currently cached.
    pub fn is_cached(&self, user_id: &str) -> bool {
        self.lookup(user_id).is_some()
    }

    fn lookup(&self, user_id: &str) -> Option<ProfileRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn insert(&self, record: ProfileRecord) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.user_id.clone(), record);
    }
}

impl<S: EmbeddingStore> EmbeddingStore for CachedStore<S> {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        if let Some(hit) = self.lookup(user_id) {
            tracing::debug!(user_id, "embedding cache hit");
            return Ok(Some(hit));
        }

        let fetched = self.inner.get(user_id).await?;
        if let Some(record) = &fetched {
            self.insert(record.clone());
            tracing::debug!(user_id, "embedding loaded and cached");
        }
        Ok(fetched)
    }

    async fn put(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        self.inner.put(user_id, embedding).await?;
        self.insert(ProfileRecord::new(user_id, embedding.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory backend that counts calls and can be told to fail.
    #[derive(Default)]
    struct CountingStore {
        records: Mutex<HashMap<String, ProfileRecord>>,
        gets: AtomicUsize,
        puts: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingStore {
        fn failing() -> Self {
            let s = Self::default();
            s.fail.store(true, Ordering::SeqCst);
            s
        }

        fn broken() -> StoreError {
            StoreError::Status {
                status: 503,
                body: "unavailable".into(),
            }
        }
    }

    impl EmbeddingStore for CountingStore {
        async fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Self::broken());
            }
            Ok(self.records.lock().unwrap().get(user_id).cloned())
        }

        async fn put(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Self::broken());
            }
            self.records
                .lock()
                .unwrap()
                .insert(user_id.to_string(), ProfileRecord::new(user_id, embedding.clone()));
            Ok(())
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[tokio::test]
    async fn test_put_writes_through_and_get_skips_backend() {
        let store = CachedStore::new(CountingStore::default());
        store.put("u1", &emb(&[1.0, 0.0])).await.unwrap();
        assert!(store.is_cached("u1"));

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.embedding.values, vec![1.0, 0.0]);
        assert_eq!(store.inner().gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner().puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let backend = CountingStore::default();
        backend
            .records
            .lock()
            .unwrap()
            .insert("u2".into(), ProfileRecord::new("u2", emb(&[0.0, 1.0])));
        let store = CachedStore::new(backend);

        assert!(store.get("u2").await.unwrap().is_some());
        assert!(store.get("u2").await.unwrap().is_some());
        assert_eq!(store.inner().gets.load(Ordering::SeqCst), 1);
        assert_eq!(store.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_absent_user_not_cached() {
        let store = CachedStore::new(CountingStore::default());
        assert!(store.get("ghost").await.unwrap().is_none());
        assert!(store.get("ghost").await.unwrap().is_none());
        assert_eq!(store.inner().gets.load(Ordering::SeqCst), 2);
        assert_eq!(store.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_put_leaves_cache_untouched() {
        let store = CachedStore::new(CountingStore::failing());
        assert!(store.put("u1", &emb(&[1.0])).await.is_err());
        assert!(!store.is_cached("u1"));
    }

    #[tokio::test]
    async fn test_failed_get_propagates() {
        let store = CachedStore::new(CountingStore::failing());
        assert!(matches!(
            store.get("u1").await,
            Err(StoreError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_reenrollment_overwrites_cached_entry() {
        let store = CachedStore::new(CountingStore::default());
        store.put("u1", &emb(&[1.0, 0.0])).await.unwrap();
        store.put("u1", &emb(&[0.0, 1.0])).await.unwrap();
        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.embedding.values, vec![0.0, 1.0]);
    }
}
