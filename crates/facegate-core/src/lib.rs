//! facegate-core — Face verification pipeline.
//!
//! Preprocesses photos into a canonical BGR raster, extracts a single unit-norm
//! face embedding through an injected [`FaceAnalyzer`], and decides whether two
//! embeddings belong to the same person.

pub mod analyzer;
pub mod extractor;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;
pub mod types;
pub mod verifier;

pub use analyzer::{AnalyzerError, FaceAnalyzer};
pub use extractor::{select_largest, EmbeddingExtractor};
pub use preprocess::{preprocess, CanonicalImage, PreprocessError};
pub use types::{BoundingBox, Detection, Embedding, ProfileRecord, VerificationResult, NORM_TOLERANCE};
pub use verifier::{Verifier, VerifyError, VERIFICATION_THRESHOLD};

/// Default directory for ONNX model files.
///
/// Resolves to `$XDG_DATA_HOME/facegate/models`, falling back to
/// `~/.local/share/facegate/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_home.join("facegate").join("models")
}
