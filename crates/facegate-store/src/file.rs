//! Embedding store backed by one JSON file.
//!
//! The file holds `{ "<user_id>": { "embedding": [f32, ...], "user_id": "<user_id>" } }`.
//! Every read reloads the whole mapping; every write rewrites it.

use crate::error::StoreError;
use crate::EmbeddingStore;
use facegate_core::{Embedding, ProfileRecord};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::Mutex;

type Mapping = BTreeMap<String, ProfileRecord>;

pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load the full mapping. A missing file is an empty mapping.
    async fn load(&self) -> Result<Mapping, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Mapping::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Mapping::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the file contents with `mapping` in a single rename.
    async fn save(&self, mapping: &Mapping) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(mapping)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Ids of every enrolled user, sorted.
    #[cfg(test)]
    async fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load().await?.into_keys().collect())
    }
}

impl EmbeddingStore for FileStore {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let mut mapping = self.load().await?;
        tracing::debug!(path = %self.path.display(), users = mapping.len(), "embeddings file loaded");

        match mapping.remove(user_id) {
            Some(record) => Ok(Some(ProfileRecord::new(user_id, record.embedding))),
            None => {
                tracing::debug!(
                    user_id,
                    available = ?mapping.keys().collect::<Vec<_>>(),
                    "user not in embeddings file"
                );
                Ok(None)
            }
        }
    }

    async fn put(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut mapping = self.load().await?;
        mapping.insert(
            user_id.to_string(),
            ProfileRecord::new(user_id, embedding.clone()),
        );
        self.save(&mapping).await?;
        tracing::info!(
            user_id,
            users = mapping.len(),
            path = %self.path.display(),
            "embedding saved to file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("embeddings_store.json"));
        assert!(store.get("u1").await.unwrap().is_none());
        assert!(store.user_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("embeddings_store.json"));
        store.put("u1", &emb(&[0.6, 0.8])).await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.embedding.values, vec![0.6, 0.8]);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("e.json"));
        store.put("u1", &emb(&[1.0, 0.0])).await.unwrap();
        store.put("u1", &emb(&[0.0, 1.0])).await.unwrap();

        let record = store.get("u1").await.unwrap().unwrap();
        assert_eq!(record.embedding.values, vec![0.0, 1.0]);
        assert_eq!(store.user_ids().await.unwrap(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.json");
        let store = FileStore::new(&path);
        store.put("alice", &emb(&[0.5, -0.5])).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"alice": {"embedding": [0.5, -0.5], "user_id": "alice"}})
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reload_sees_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.json");
        let store = FileStore::new(&path);
        store.put("a", &emb(&[1.0])).await.unwrap();

        std::fs::write(
            &path,
            r#"{"b": {"embedding": [0.25], "user_id": "b"}}"#,
        )
        .unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.get("b").await.unwrap().unwrap().embedding.values, vec![0.25]);
    }

    #[tokio::test]
    async fn test_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/deeper/e.json"));
        store.put("u", &emb(&[1.0])).await.unwrap();
        assert!(store.get("u").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(store.get("u").await, Err(StoreError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_all_users() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileStore::new(dir.path().join("e.json")));
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.put(&format!("user{i}"), &emb(&[i as f32])).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(store.user_ids().await.unwrap().len(), 8);
    }
}
