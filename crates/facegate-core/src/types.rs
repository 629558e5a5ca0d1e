use serde::{Deserialize, Serialize};

/// Allowed deviation of an embedding's Euclidean norm from 1.0.
pub const NORM_TOLERANCE: f32 = 0.01;

/// Axis-aligned face bounding box in source-image pixels, as `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Box area (width × height).
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// One face reported by the face-analysis capability.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1].
    pub det_score: f32,
    /// Embedding as produced upstream; expected, but not trusted, to be unit-norm.
    pub normed_embedding: Vec<f32>,
}

/// Face embedding vector (512-dimensional for ArcFace).
///
/// Serializes as a bare JSON number array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean (L2) norm.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Whether the norm is within `tolerance` of 1.0.
    pub fn is_unit(&self, tolerance: f32) -> bool {
        (self.norm() - 1.0).abs() <= tolerance
    }

    /// Return a unit-norm copy. A zero vector is returned unchanged.
    pub fn normalized(&self) -> Embedding {
        let norm = self.norm();
        if norm > 0.0 {
            Embedding {
                values: self.values.iter().map(|v| v / norm).collect(),
            }
        } else {
            self.clone()
        }
    }

    /// Dot product over the common prefix of both vectors.
    pub fn dot(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// The single enrolled embedding for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub embedding: Embedding,
    pub user_id: String,
}

impl ProfileRecord {
    pub fn new(user_id: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            embedding,
            user_id: user_id.into(),
        }
    }
}

/// Outcome of comparing a probe embedding with an enrolled one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
    pub threshold: f32,
}

impl VerificationResult {
    /// Similarity clamped to [0, 1] and scaled to a percentage. Display only.
    pub fn confidence_pct(&self) -> f32 {
        self.similarity.clamp(0.0, 1.0) * 100.0
    }
}
