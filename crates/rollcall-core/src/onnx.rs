//! Default extractor: ONNX Runtime face detector plus face embedder.
//!
//! The detector is an anchor-free model with score/bbox heads at strides
//! 8/16/32; the embedder takes a square face crop resized to 112x112 and
//! produces a 128-dimensional L2-normalized embedding.

use crate::extractor::{Extractor, ExtractorError};
use crate::types::{BoundingBox, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const DET_INPUT_SIZE: usize = 320;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.6;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

const EMB_INPUT_SIZE: usize = 112;
const EMB_MEAN: f32 = 127.5;
const EMB_STD: f32 = 127.5;
/// Embedding dimensionality of the bundled embedder model.
pub const EMBEDDING_DIM: usize = 128;

/// Extra margin added around a detected box before cropping, as a fraction
/// of the box size. Embedder models expect some forehead/chin context.
const CROP_MARGIN: f32 = 0.2;

/// ONNX-backed face detector + embedder.
pub struct OnnxExtractor {
    detector: Session,
    embedder: Session,
}

impl OnnxExtractor {
    /// Load both ONNX models. Fails fast if either file is absent.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, ExtractorError> {
        let detector = load_session(detector_path)?;
        if detector.outputs().len() < 6 {
            return Err(ExtractorError::InferenceFailed(format!(
                "detector must expose 6 outputs (3 strides x score/bbox), got {}",
                detector.outputs().len()
            )));
        }
        let embedder = load_session(embedder_path)?;

        Ok(Self { detector, embedder })
    }

    /// Detect faces in a grayscale frame, best confidence first.
    pub fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, ExtractorError> {
        let resized = resize_bilinear(
            frame,
            width as usize,
            height as usize,
            DET_INPUT_SIZE,
            DET_INPUT_SIZE,
        );
        let input = gray_to_tensor(&resized, DET_INPUT_SIZE, DET_MEAN, DET_STD);

        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Stretch resize, so detections map back with per-axis scales.
        let scale_x = width as f32 / DET_INPUT_SIZE as f32;
        let scale_y = height as f32 / DET_INPUT_SIZE as f32;

        let mut detections = Vec::new();
        for (pos, &stride) in DET_STRIDES.iter().enumerate() {
            // Positional layout: [0-2] score heads, [3-5] bbox heads.
            let (_, scores) = outputs[pos].try_extract_tensor::<f32>().map_err(|e| {
                ExtractorError::InferenceFailed(format!("scores stride {stride}: {e}"))
            })?;
            let (_, bboxes) = outputs[pos + 3].try_extract_tensor::<f32>().map_err(|e| {
                ExtractorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
            })?;

            decode_stride(scores, bboxes, stride, scale_x, scale_y, &mut detections);
        }

        let mut kept = nms(detections, DET_NMS_IOU);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }

    /// Extract an embedding for one detected face.
    fn embed(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, ExtractorError> {
        let crop = crop_square(frame, width as usize, height as usize, face, CROP_MARGIN);
        let resized = resize_bilinear(
            &crop.data,
            crop.side,
            crop.side,
            EMB_INPUT_SIZE,
            EMB_INPUT_SIZE,
        );
        let input = gray_to_tensor(&resized, EMB_INPUT_SIZE, EMB_MEAN, EMB_STD);

        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("embedding head: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(ExtractorError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

impl Extractor for OnnxExtractor {
    fn detect_and_embed(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<(BoundingBox, Embedding)>, ExtractorError> {
        let faces = self.detect(frame, width, height)?;
        let mut out = Vec::with_capacity(faces.len());
        for face in faces {
            let embedding = self.embed(frame, width, height, &face)?;
            out.push((face, embedding));
        }
        Ok(out)
    }
}

fn load_session(model_path: &str) -> Result<Session, ExtractorError> {
    if !Path::new(model_path).exists() {
        return Err(ExtractorError::ModelNotFound(model_path.to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;

    tracing::info!(
        path = model_path,
        inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded ONNX model"
    );
    Ok(session)
}

/// Decode one anchor-free stride level into frame-space boxes.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    scale_x: f32,
    scale_y: f32,
    out: &mut Vec<BoundingBox>,
) {
    let grid = DET_INPUT_SIZE / stride;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= DET_SCORE_THRESHOLD {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = ((cell % grid) * stride) as f32;
        let anchor_cy = ((cell / grid) * stride) as f32;

        // bbox head: [left, top, right, bottom] offsets in stride units.
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        out.push(BoundingBox {
            x: x1 * scale_x,
            y: y1 * scale_y,
            width: (x2 - x1) * scale_x,
            height: (y2 - y1) * scale_y,
            confidence: score,
        });
    }
}

/// Non-maximum suppression, highest confidence first.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

struct SquareCrop {
    data: Vec<u8>,
    side: usize,
}

/// Cut a square region centred on the box, expanded by `margin`, clamped to
/// the frame. Out-of-frame pixels stay zero.
fn crop_square(
    frame: &[u8],
    width: usize,
    height: usize,
    face: &BoundingBox,
    margin: f32,
) -> SquareCrop {
    let side_f = face.width.max(face.height) * (1.0 + margin);
    let side = (side_f.round() as usize).max(1);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let x0 = (cx - side_f / 2.0).round() as i64;
    let y0 = (cy - side_f / 2.0).round() as i64;

    let mut data = vec![0u8; side * side];
    for row in 0..side {
        let sy = y0 + row as i64;
        if sy < 0 || sy >= height as i64 {
            continue;
        }
        for col in 0..side {
            let sx = x0 + col as i64;
            if sx < 0 || sx >= width as i64 {
                continue;
            }
            data[row * side + col] = frame[sy as usize * width + sx as usize];
        }
    }
    SquareCrop { data, side }
}

/// Bilinear grayscale resize.
fn resize_bilinear(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    if sw == 0 || sh == 0 || src.len() < sw * sh {
        return vec![0u8; dw * dh];
    }

    let x_ratio = sw as f32 / dw as f32;
    let y_ratio = sh as f32 / dh as f32;
    let mut dst = vec![0u8; dw * dh];

    for y in 0..dh {
        let src_y = (y as f32 + 0.5) * y_ratio - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, sh as i32 - 1) as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dw {
            let src_x = (x as f32 + 0.5) * x_ratio - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, sw as i32 - 1) as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let top = src[y0 * sw + x0] as f32 * (1.0 - fx) + src[y0 * sw + x1] as f32 * fx;
            let bot = src[y1 * sw + x0] as f32 * (1.0 - fx) + src[y1 * sw + x1] as f32 * fx;
            dst[y * dw + x] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
        }
    }
    dst
}

/// Normalize a grayscale square into a NCHW float tensor, Y replicated to
/// all three channels.
fn gray_to_tensor(gray: &[u8], size: usize, mean: f32, std: f32) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let pixel = gray.get(y * size + x).copied().unwrap_or(0) as f32;
            let normalized = (pixel - mean) / std;
            tensor[[0, 0, y, x]] = normalized;
            tensor[[0, 1, y, x]] = normalized;
            tensor[[0, 2, y, x]] = normalized;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
