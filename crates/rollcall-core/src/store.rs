//! Encoding store: the persisted database of enrolled embeddings.
//!
//! On disk this is a JSON object with three index-aligned arrays
//! (`encodings`, `names`, `ids`); index *i* across all three describes one
//! enrollment entry. In memory it is an ordered entry list; the order is
//! fixed at load time and doubles as the matcher's tie-break.

use crate::types::{Embedding, Identity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("encoding store not found at {0}: run `rollcall enroll` first")]
    Missing(PathBuf),
    #[error("encoding store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("encoding store arrays are misaligned: {encodings} encodings, {names} names, {ids} ids")]
    Misaligned {
        encodings: usize,
        names: usize,
        ids: usize,
    },
    #[error("encoding store entry {index} has an empty embedding")]
    EmptyEmbedding { index: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// One enrolled sample: an identity and the embedding of one of its
/// enrollment images.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub identity: Identity,
    pub embedding: Embedding,
}

/// The in-memory encoding store. Loaded once per run, read-only afterwards.
#[derive(Debug, Default)]
pub struct EncodingStore {
    entries: Vec<StoreEntry>,
}

/// On-disk shape of the store file.
#[derive(Serialize, Deserialize)]
struct StoreFile {
    encodings: Vec<Vec<f32>>,
    names: Vec<String>,
    ids: Vec<String>,
}

impl EncodingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Insertion order is the matcher tie-break order.
    pub fn push(&mut self, identity: Identity, embedding: Embedding) {
        self.entries.push(StoreEntry {
            identity,
            embedding,
        });
    }

    pub fn entries(&self) -> &[StoreEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist the store, creating the parent directory if absent.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = StoreFile {
            encodings: self
                .entries
                .iter()
                .map(|e| e.embedding.values.clone())
                .collect(),
            names: self.entries.iter().map(|e| e.identity.name.clone()).collect(),
            ids: self.entries.iter().map(|e| e.identity.id.clone()).collect(),
        };

        fs::write(path, serde_json::to_string(&file)?)?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "encoding store saved");
        Ok(())
    }

    /// Load and validate a persisted store.
    ///
    /// A missing file is the operator-facing "run enrollment first" case;
    /// misaligned arrays or empty embeddings are treated as corruption and
    /// rejected rather than partially loaded.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }

        let file: StoreFile = serde_json::from_str(&fs::read_to_string(path)?)?;

        if file.encodings.len() != file.names.len() || file.names.len() != file.ids.len() {
            return Err(StoreError::Misaligned {
                encodings: file.encodings.len(),
                names: file.names.len(),
                ids: file.ids.len(),
            });
        }

        let mut entries = Vec::with_capacity(file.encodings.len());
        for (index, ((values, name), id)) in file
            .encodings
            .into_iter()
            .zip(file.names)
            .zip(file.ids)
            .enumerate()
        {
            if values.is_empty() {
                return Err(StoreError::EmptyEmbedding { index });
            }
            entries.push(StoreEntry {
                identity: Identity::new(name, id),
                embedding: Embedding::new(values),
            });
        }

        tracing::info!(path = %path.display(), entries = entries.len(), "encoding store loaded");
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_store() -> EncodingStore {
        let mut store = EncodingStore::new();
        store.push(
            Identity::new("Alice", "101"),
            Embedding::new(vec![0.25, -0.5, 0.125]),
        );
        store.push(
            Identity::new("Alice", "101"),
            Embedding::new(vec![0.24, -0.51, 0.13]),
        );
        store.push(Identity::new("Bob", "102"), Embedding::new(vec![0.9, 0.1, 0.0]));
        store
    }

    #[test]
    fn round_trip_preserves_entries_and_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("face_encodings.json");

        let store = sample_store();
        store.save(&path).unwrap();
        let loaded = EncodingStore::load(&path).unwrap();

        assert_eq!(loaded.entries(), store.entries());
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encodings").join("face_encodings.json");

        sample_store().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn missing_file_is_its_own_error() {
        let dir = tempdir().unwrap();
        let err = EncodingStore::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
        assert!(err.to_string().contains("run `rollcall enroll` first"));
    }

    #[test]
    fn misaligned_arrays_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"encodings":[[0.1],[0.2]],"names":["Alice"],"ids":["101"]}"#,
        )
        .unwrap();

        let err = EncodingStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Misaligned { encodings: 2, names: 1, ids: 1 }));
    }

    #[test]
    fn empty_embedding_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(
            &path,
            r#"{"encodings":[[]],"names":["Alice"],"ids":["101"]}"#,
        )
        .unwrap();

        let err = EncodingStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::EmptyEmbedding { index: 0 }));
    }

    #[test]
    fn garbage_json_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.json");
        fs::write(&path, "not json at all").unwrap();

        let err = EncodingStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
