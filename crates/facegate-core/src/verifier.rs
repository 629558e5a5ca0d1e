//! Same-person decision between a freshly extracted and an enrolled embedding.

use crate::types::{Embedding, VerificationResult};
use thiserror::Error;

/// Cosine similarity at or above which two faces are the same person.
pub const VERIFICATION_THRESHOLD: f32 = 0.62;

/// Below-threshold similarities above this are logged as close matches.
const CLOSE_MATCH_FLOOR: f32 = 0.55;

#[derive(Error, Debug, PartialEq)]
pub enum VerifyError {
    #[error("embedding dimension mismatch: probe has {probe}, enrolled has {enrolled}")]
    DimensionMismatch { probe: usize, enrolled: usize },
}

/// Cosine similarity of two embeddings.
///
/// Both inputs are re-normalized first, so the dot product is the cosine.
/// Rounding can push it slightly outside [-1, 1]; the result is clamped.
pub fn similarity(a: &Embedding, b: &Embedding) -> f32 {
    a.normalized().dot(&b.normalized()).clamp(-1.0, 1.0)
}

/// Stateless threshold decision over cosine similarity.
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    threshold: f32,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            threshold: VERIFICATION_THRESHOLD,
        }
    }
}

impl Verifier {
    /// Threshold decision for an already computed similarity.
    pub fn decide(&self, similarity: f32) -> VerificationResult {
        VerificationResult {
            verified: similarity >= self.threshold,
            similarity,
            threshold: self.threshold,
        }
    }

    /// Compare a probe embedding against the enrolled one.
    pub fn verify(
        &self,
        probe: &Embedding,
        enrolled: &Embedding,
    ) -> Result<VerificationResult, VerifyError> {
        if probe.len() != enrolled.len() {
            return Err(VerifyError::DimensionMismatch {
                probe: probe.len(),
                enrolled: enrolled.len(),
            });
        }

        let result = self.decide(similarity(probe, enrolled));

        tracing::info!(
            similarity = result.similarity,
            confidence_pct = result.confidence_pct(),
            threshold = result.threshold,
            verified = result.verified,
            "verification decided"
        );
        if !result.verified && result.similarity > CLOSE_MATCH_FLOOR {
            tracing::warn!(
                diff = result.threshold - result.similarity,
                "close match below threshold"
            );
        }

        Ok(result)
    }
}
