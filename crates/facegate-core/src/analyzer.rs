//! Face-analysis capability consumed by the extractor.

use crate::preprocess::CanonicalImage;
use crate::types::Detection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0} — download the buffalo_l pack from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[cfg(feature = "onnx")]
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detects faces in a canonical BGR image and embeds each of them.
///
/// Implementations may be stateful (e.g. hold inference sessions) but must
/// return the same detections for the same image.
pub trait FaceAnalyzer {
    fn analyze(&mut self, image: &CanonicalImage) -> Result<Vec<Detection>, AnalyzerError>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn analyze(&mut self, image: &CanonicalImage) -> Result<Vec<Detection>, AnalyzerError> {
        (**self).analyze(image)
    }
}
