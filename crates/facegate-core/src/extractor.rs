//! Single-face embedding extraction over a [`FaceAnalyzer`].

use crate::analyzer::FaceAnalyzer;
use crate::preprocess::CanonicalImage;
use crate::types::{Detection, Embedding};
use std::panic::{self, AssertUnwindSafe};

/// Pick the detection with the largest bounding-box area.
///
/// Equal areas resolve to the first detection encountered, so the choice is
/// reproducible for a given detection order.
pub fn select_largest(detections: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for det in detections {
        match best {
            Some(b) if det.bbox.area() <= b.bbox.area() => {}
            _ => best = Some(det),
        }
    }
    best
}

/// Turns a canonical image into at most one unit-norm embedding.
pub struct EmbeddingExtractor<A> {
    analyzer: A,
}

impl<A: FaceAnalyzer> EmbeddingExtractor<A> {
    pub fn new(analyzer: A) -> Self {
        Self { analyzer }
    }

    /// Extract the embedding of the largest face.
    ///
    /// Returns `None` when no face is found. Analyzer errors and panics are
    /// logged and also reported as `None`; they never reach the caller.
    pub fn extract(&mut self, image: &CanonicalImage) -> Option<Embedding> {
        let analyzer = &mut self.analyzer;
        let detections = match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(image))) {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "face analysis failed");
                return None;
            }
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic = %msg, "face analysis panicked");
                return None;
            }
        };

        let Some(face) = select_largest(&detections) else {
            tracing::warn!("no face detected in image");
            return None;
        };

        tracing::info!(
            faces = detections.len(),
            bbox = ?face.bbox,
            det_score = face.det_score,
            "using largest face"
        );

        let embedding = Embedding::new(face.normed_embedding.clone());
        if embedding.is_empty() {
            tracing::warn!("selected face has an empty embedding");
            return None;
        }
        Some(embedding.normalized())
    }
}
