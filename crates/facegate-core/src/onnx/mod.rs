//! InsightFace `buffalo_l` face analysis via ONNX Runtime.
//!
//! SCRFD (`det_10g.onnx`) finds faces and five landmarks; ArcFace
//! (`w600k_r50.onnx`) embeds each aligned 112×112 crop.

mod alignment;
pub mod detector;
pub mod recognizer;

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::preprocess::CanonicalImage;
use crate::types::Detection;
use std::path::Path;

pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Detector + recognizer pair implementing [`FaceAnalyzer`].
pub struct InsightFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl InsightFaceAnalyzer {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for InsightFaceAnalyzer {
    fn analyze(&mut self, image: &CanonicalImage) -> Result<Vec<Detection>, AnalyzerError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(faces = faces.len(), "SCRFD detections");

        let mut detections = Vec::with_capacity(faces.len());
        for face in faces {
            let normed_embedding = self.recognizer.embed(image, &face.landmarks)?;
            detections.push(Detection {
                bbox: face.bbox,
                det_score: face.score,
                normed_embedding,
            });
        }
        Ok(detections)
    }
}
