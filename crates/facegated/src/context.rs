use crate::engine::EngineHandle;
use crate::error::ApiError;
use facegate_core::{Embedding, VerificationResult, Verifier, NORM_TOLERANCE};
use facegate_store::{Backend, CachedStore, EmbeddingStore, StorageMode};

/// Everything a request needs, built once at startup and shared by all handlers.
pub struct AppContext {
    store: CachedStore<Backend>,
    engine: EngineHandle,
    verifier: Verifier,
}

impl AppContext {
    pub fn new(backend: Backend, engine: EngineHandle) -> Self {
        Self {
            store: CachedStore::new(backend),
            engine,
            verifier: Verifier::default(),
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.store.inner().mode()
    }

    async fn embed(&self, photo: Vec<u8>) -> Result<Embedding, ApiError> {
        let embedding = self.engine.extract(photo).await?;
        let embedding = embedding.ok_or(ApiError::NoFaceDetected)?;
        if !embedding.is_unit(NORM_TOLERANCE) {
            tracing::warn!(norm = embedding.norm(), "embedding not unit length, renormalizing");
            return Ok(embedding.normalized());
        }
        Ok(embedding)
    }

    /// Extract the face in `photo` and store it as `user_id`'s profile.
    pub async fn enroll(&self, user_id: &str, photo: Vec<u8>) -> Result<(), ApiError> {
        let embedding = self.embed(photo).await?;
        tracing::debug!(user_id, dims = embedding.len(), norm = embedding.norm(), "enrollment embedding");

        self.store
            .put(user_id, &embedding)
            .await
            .map_err(|source| ApiError::StorageFailure {
                message: match self.storage_mode() {
                    StorageMode::Database => "Failed to save embedding to database",
                    StorageMode::File => "Failed to save embedding to file",
                },
                source,
            })?;

        tracing::info!(user_id, mode = %self.storage_mode(), "profile enrolled");
        Ok(())
    }

    /// Extract the face in `photo` and compare it with `user_id`'s profile.
    pub async fn verify(&self, user_id: &str, photo: Vec<u8>) -> Result<VerificationResult, ApiError> {
        let probe = self.embed(photo).await?;

        let record = self
            .store
            .get(user_id)
            .await
            .map_err(|source| ApiError::StorageFailure {
                message: "Failed to retrieve user profile",
                source,
            })?;
        let Some(record) = record else {
            tracing::warn!(user_id, "verification requested for unknown user");
            return Err(ApiError::ProfileNotFound);
        };

        let result = self
            .verifier
            .verify(&probe, &record.embedding)
            .map_err(|e| ApiError::UnexpectedFailure(e.to_string()))?;

        tracing::info!(
            user_id,
            verified = result.verified,
            similarity = result.similarity,
            "verification complete"
        );
        Ok(result)
    }
}
