//! ArcFace recognizer (w600k_r50), 512-dimensional embeddings.

use super::alignment::{self, ALIGNED_SIZE};
use crate::analyzer::AnalyzerError;
use crate::preprocess::CanonicalImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const MEAN: f32 = 127.5;
const STD: f32 = 127.5; // symmetric, unlike SCRFD
const EMBEDDING_DIM: usize = 512;

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, AnalyzerError> {
        if !model_path.exists() {
            return Err(AnalyzerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded ArcFace model");
        Ok(Self { session })
    }

    /// Align the face at `landmarks` and return its L2-normalized embedding.
    pub fn embed(
        &mut self,
        image: &CanonicalImage,
        landmarks: &[(f32, f32); 5],
    ) -> Result<Vec<f32>, AnalyzerError> {
        let crop = alignment::align_face(image, landmarks);
        let input = to_input_tensor(&crop);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalyzerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(AnalyzerError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        Ok(if norm > 0.0 {
            raw.iter().map(|v| v / norm).collect()
        } else {
            raw.to_vec()
        })
    }
}

/// 112×112 BGR crop → normalized RGB NCHW tensor.
fn to_input_tensor(crop: &[u8]) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, ALIGNED_SIZE, ALIGNED_SIZE));
    for y in 0..ALIGNED_SIZE {
        for x in 0..ALIGNED_SIZE {
            let i = (y * ALIGNED_SIZE + x) * 3;
            tensor[[0, 0, y, x]] = (crop[i + 2] as f32 - MEAN) / STD;
            tensor[[0, 1, y, x]] = (crop[i + 1] as f32 - MEAN) / STD;
            tensor[[0, 2, y, x]] = (crop[i] as f32 - MEAN) / STD;
        }
    }
    tensor
}
