//! SCRFD face detector.
//!
//! Anchor-free decoding over strides 8/16/32 followed by NMS. The input is
//! resized into the top-left corner of a 640×640 canvas (InsightFace layout).

use crate::analyzer::AnalyzerError;
use crate::preprocess::CanonicalImage;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use std::path::Path;

const INPUT_SIZE: usize = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// A detected face before embedding.
#[derive(Debug, Clone)]
pub struct FaceCandidate {
    pub bbox: BoundingBox,
    pub score: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth] in image pixels.
    pub landmarks: [(f32, f32); 5],
}

/// (score, bbox, kps) output positions for one stride.
type StrideOutputs = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, AnalyzerError> {
        if !model_path.exists() {
            return Err(AnalyzerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(AnalyzerError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                names.len()
            )));
        }
        let outputs = output_layout(&names);

        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            layout = ?outputs,
            "loaded SCRFD model"
        );

        Ok(Self { session, outputs })
    }

    /// Detect faces, highest score first.
    pub fn detect(&mut self, image: &CanonicalImage) -> Result<Vec<FaceCandidate>, AnalyzerError> {
        let (input, scale) = to_input_tensor(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.outputs[pos];
            let scores = tensor_data(&outputs[score_idx], "scores", stride)?;
            let bboxes = tensor_data(&outputs[bbox_idx], "bboxes", stride)?;
            let kps = tensor_data(&outputs[kps_idx], "kps", stride)?;
            candidates.extend(decode_stride(scores, bboxes, kps, stride, scale));
        }

        Ok(nms(candidates, NMS_THRESHOLD))
    }
}

fn tensor_data<'a>(value: &'a DynValue, what: &str, stride: usize) -> Result<&'a [f32], AnalyzerError> {
    value
        .try_extract_tensor::<f32>()
        .map(|(_, data)| data)
        .map_err(|e| AnalyzerError::InferenceFailed(format!("{what} stride {stride}: {e}")))
}

/// Map output names like `score_8` / `bbox_16` / `kps_32` to stride slots,
/// falling back to the standard positional export order.
fn output_layout(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut layout = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
    for (slot, &stride) in STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => layout[slot] = (s, b, k),
            _ => return [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
        }
    }
    layout
}

/// Resize (bilinear, aspect preserved) into the top-left of the square input
/// and normalize to an RGB NCHW tensor. Returns the tensor and the scale
/// applied to the source image.
fn to_input_tensor(image: &CanonicalImage) -> (Array4<f32>, f32) {
    let (w, h) = (image.width as usize, image.height as usize);
    let scale = (INPUT_SIZE as f32 / w as f32).min(INPUT_SIZE as f32 / h as f32);
    let new_w = ((w as f32 * scale) as usize).clamp(1, INPUT_SIZE);
    let new_h = ((h as f32 * scale) as usize).clamp(1, INPUT_SIZE);

    let pad = (0.0 - MEAN) / STD;
    let mut tensor = Array4::<f32>::from_elem((1, 3, INPUT_SIZE, INPUT_SIZE), pad);
    let inv = 1.0 / scale;

    for y in 0..new_h {
        let sy = ((y as f32 + 0.5) * inv - 0.5).clamp(0.0, (h - 1) as f32);
        let y0 = sy as usize;
        let y1 = (y0 + 1).min(h - 1);
        let fy = sy - y0 as f32;
        for x in 0..new_w {
            let sx = ((x as f32 + 0.5) * inv - 0.5).clamp(0.0, (w - 1) as f32);
            let x0 = sx as usize;
            let x1 = (x0 + 1).min(w - 1);
            let fx = sx - x0 as f32;

            // BGR source → RGB planes.
            for (plane, channel) in [(0usize, 2usize), (1, 1), (2, 0)] {
                let at = |px: usize, py: usize| image.data[(py * w + px) * 3 + channel] as f32;
                let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
                let bot = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
                let v = top * (1.0 - fy) + bot * fy;
                tensor[[0, plane, y, x]] = (v - MEAN) / STD;
            }
        }
    }

    (tensor, scale)
}

fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    scale: f32,
) -> Vec<FaceCandidate> {
    let grid = INPUT_SIZE / stride;
    let s = stride as f32;
    let mut out = Vec::new();

    for (idx, &score) in scores.iter().enumerate().take(grid * grid * ANCHORS_PER_CELL) {
        if score < SCORE_THRESHOLD {
            continue;
        }
        let b = idx * 4;
        let k = idx * 10;
        if b + 3 >= bboxes.len() || k + 9 >= kps.len() {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let cx = (cell % grid) as f32 * s;
        let cy = (cell / grid) as f32 * s;

        let bbox = BoundingBox {
            x1: (cx - bboxes[b] * s) / scale,
            y1: (cy - bboxes[b + 1] * s) / scale,
            x2: (cx + bboxes[b + 2] * s) / scale,
            y2: (cy + bboxes[b + 3] * s) / scale,
        };
        let landmarks = std::array::from_fn(|i| {
            (
                (cx + kps[k + i * 2] * s) / scale,
                (cy + kps[k + i * 2 + 1] * s) / scale,
            )
        });

        out.push(FaceCandidate {
            bbox,
            score,
            landmarks,
        });
    }

    out
}

fn nms(mut candidates: Vec<FaceCandidate>, iou_threshold: f32) -> Vec<FaceCandidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut keep: Vec<FaceCandidate> = Vec::new();
    for c in candidates {
        if keep.iter().all(|k| iou(&k.bbox, &c.bbox) <= iou_threshold) {
            keep.push(c);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let iw = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let ih = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = iw * ih;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
