//! Extractor capability interface.
//!
//! Face detection and embedding extraction are an opaque capability behind
//! this trait, so the matcher, ledger, and enrollment encoder stay testable
//! with synthetic embeddings and no model files.

use crate::types::{BoundingBox, Embedding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0} (set ROLLCALL_MODEL_DIR or place the ONNX files there)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detects faces in a grayscale frame and computes one embedding per face.
///
/// `frame` is row-major `width * height` bytes. Faces are returned in
/// detector order; the caller processes them independently.
pub trait Extractor {
    fn detect_and_embed(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<(BoundingBox, Embedding)>, ExtractorError>;
}
