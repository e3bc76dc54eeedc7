//! rollcall-core — Embedding matching and attendance deduplication.
//!
//! Builds an encoding store from enrollment images, matches live face
//! embeddings against it under a Euclidean distance threshold, and keeps
//! an idempotent per-day, per-lecture attendance ledger.

pub mod enroll;
pub mod extractor;
pub mod ledger;
pub mod onnx;
pub mod store;
pub mod types;

pub use extractor::{Extractor, ExtractorError};
pub use ledger::{AttendanceRecord, CsvTableStore, Ledger, MarkOutcome, TableStore};
pub use onnx::OnnxExtractor;
pub use store::{EncodingStore, StoreEntry};
pub use types::{BoundingBox, Embedding, EuclideanMatcher, Identity, MatchResult, Matcher};
pub use types::DEFAULT_TOLERANCE;
