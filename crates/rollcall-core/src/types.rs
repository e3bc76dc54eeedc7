use serde::{Deserialize, Serialize};

use crate::store::StoreEntry;

/// Maximum Euclidean distance at which two embeddings are considered the
/// same person. Lower is stricter.
pub const DEFAULT_TOLERANCE: f32 = 0.45;

/// An enrolled person. `id` is the attendance deduplication key; uniqueness
/// is assumed from the enrollment dataset, not enforced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub id: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector. Fixed-length per extractor model, immutable once
/// computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance to another embedding.
    ///
    /// Dimensions are paired positionally; a length mismatch truncates to
    /// the shorter vector, which only happens when mixing extractor models.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Result of matching a probe embedding against the encoding store.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Resolved identity, or `None` for an unknown face.
    pub identity: Option<Identity>,
    /// Distance of the best store entry, `f32::INFINITY` for an empty store.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for resolving a probe embedding against the enrolled gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[StoreEntry], tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour Euclidean matcher.
///
/// A gallery entry is a candidate when its distance is `<= tolerance`
/// (inclusive). The global minimum wins; equal minima resolve to the lowest
/// store index, so the result is a pure function of the probe, the store
/// snapshot, and the tolerance.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[StoreEntry], tolerance: f32) -> MatchResult {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&entry.embedding);
            // Strict `<` keeps the lowest index on ties.
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_distance <= tolerance => MatchResult {
                identity: Some(gallery[idx].identity.clone()),
                distance: best_distance,
            },
            _ => MatchResult {
                identity: None,
                distance: best_distance,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: &str, values: Vec<f32>) -> StoreEntry {
        StoreEntry {
            identity: Identity::new(name, id),
            embedding: Embedding::new(values),
        }
    }

    #[test]
    fn distance_identical_is_zero() {
        let a = Embedding::new(vec![0.5, -0.25, 1.0]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn nearest_candidate_wins() {
        // Alice at 0.2, Bob at 0.9, T = 0.45 -> Alice.
        let gallery = vec![
            entry("Alice", "101", vec![0.2, 0.0]),
            entry("Bob", "102", vec![0.9, 0.0]),
        ];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
        assert_eq!(result.identity, Some(Identity::new("Alice", "101")));
        assert!((result.distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn beyond_tolerance_is_unknown() {
        let gallery = vec![entry("Alice", "101", vec![0.5, 0.0])];
        let probe = Embedding::new(vec![0.0, 0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
        assert!(result.identity.is_none());
        assert!((result.distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        // 0.25 squares and square-roots exactly in f32, so the distance is
        // exactly equal to the tolerance.
        let gallery = vec![entry("Alice", "101", vec![0.25])];
        let probe = Embedding::new(vec![0.0]);

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.25);
        assert_eq!(result.identity, Some(Identity::new("Alice", "101")));
    }

    #[test]
    fn equal_minima_resolve_to_lowest_index() {
        // Both entries sit at exactly 0.25 from the probe.
        let gallery = vec![
            entry("First", "1", vec![0.25]),
            entry("Second", "2", vec![-0.25]),
        ];
        let probe = Embedding::new(vec![0.0]);

        for _ in 0..10 {
            let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
            assert_eq!(result.identity, Some(Identity::new("First", "1")));
        }
    }

    #[test]
    fn repeated_compare_is_deterministic() {
        let gallery = vec![
            entry("Alice", "101", vec![0.1, 0.2, 0.3]),
            entry("Bob", "102", vec![0.3, 0.2, 0.1]),
        ];
        let probe = Embedding::new(vec![0.11, 0.2, 0.3]);

        let first = EuclideanMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
        for _ in 0..5 {
            let again = EuclideanMatcher.compare(&probe, &gallery, DEFAULT_TOLERANCE);
            assert_eq!(again.identity, first.identity);
            assert_eq!(again.distance, first.distance);
        }
    }

    #[test]
    fn empty_gallery_never_matches() {
        let probe = Embedding::new(vec![1.0, 2.0]);
        let result = EuclideanMatcher.compare(&probe, &[], DEFAULT_TOLERANCE);
        assert!(result.identity.is_none());
        assert_eq!(result.distance, f32::INFINITY);
    }
}
