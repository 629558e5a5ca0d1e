//! Embedding store backed by the remote backend service.
//!
//! `GET  {base}/embeddings/user/{user_id}` → `200 {user_id, embedding}` | `404`
//! `POST {base}/embeddings` with `{user_id, embedding}` → `200`
//!
//! The `embedding` field travels as a JSON-encoded number array inside a string.

use crate::error::StoreError;
use crate::EmbeddingStore;
use facegate_core::{Embedding, ProfileRecord};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL, e.g. `http://localhost:8080/api/v1`.
    pub base_url: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct SaveEmbeddingRequest<'a> {
    user_id: &'a str,
    embedding: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    user_id: String,
    embedding: EncodedEmbedding,
}

/// The service sends a string; a bare array is accepted as well.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EncodedEmbedding {
    Text(String),
    Values(Vec<f32>),
}

impl EncodedEmbedding {
    fn decode(self) -> Result<Embedding, StoreError> {
        let values = match self {
            EncodedEmbedding::Text(s) => serde_json::from_str::<Vec<f32>>(&s)?,
            EncodedEmbedding::Values(v) => v,
        };
        if values.is_empty() {
            return Err(StoreError::InvalidRecord("empty embedding".into()));
        }
        Ok(Embedding::new(values))
    }
}

/// HTTP client for the remote embedding service. Requests are never retried.
pub struct RemoteStore {
    client: reqwest::Client,
    base: Url,
    config: RemoteConfig,
}

impl RemoteStore {
    pub fn new(config: RemoteConfig) -> Result<Self, StoreError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.base_url.clone()));
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// `base` joined with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let url = self.endpoint(&["embeddings", "user", user_id])?;
        let response = self
            .client
            .get(url)
            .timeout(self.config.read_timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: EmbeddingResponse = response.json().await?;
                if body.user_id != user_id {
                    tracing::warn!(
                        requested = user_id,
                        returned = %body.user_id,
                        "backend returned a record for a different user id"
                    );
                }
                Ok(Some(ProfileRecord::new(user_id, body.embedding.decode()?)))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn save(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let url = self.endpoint(&["embeddings"])?;
        let payload = SaveEmbeddingRequest {
            user_id,
            embedding: serde_json::to_string(&embedding.values)?,
        };
        let response = self
            .client
            .post(url)
            .timeout(self.config.write_timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

impl EmbeddingStore for RemoteStore {
    async fn get(&self, user_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let result = self.fetch(user_id).await;
        match &result {
            Ok(Some(_)) => tracing::debug!(user_id, "embedding loaded from backend"),
            Ok(None) => tracing::debug!(user_id, "no embedding in backend"),
            Err(e) => tracing::error!(user_id, error = %e, timeout = e.is_timeout(), "backend read failed"),
        }
        result
    }

    async fn put(&self, user_id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let result = self.save(user_id, embedding).await;
        match &result {
            Ok(()) => tracing::info!(user_id, "embedding saved to backend"),
            Err(e) => tracing::error!(user_id, error = %e, timeout = e.is_timeout(), "backend write failed"),
        }
        result
    }
}
