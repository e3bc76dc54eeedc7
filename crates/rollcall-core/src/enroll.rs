//! Enrollment encoder: builds the encoding store from a dataset directory.
//!
//! Dataset layout is `<root>/<name>_<id>/*.jpg|*.png`, one subdirectory per
//! person. Per-image problems (unreadable file, no detectable face,
//! extractor failure) are skipped with a log line; only a missing dataset
//! root aborts the run.

use crate::extractor::Extractor;
use crate::store::EncodingStore;
use crate::types::Identity;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sentinel id used when a folder name does not parse as `<name>_<id>`.
pub const FALLBACK_ID: &str = "Unknown";

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("dataset directory not found: {0}")]
    DatasetMissing(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a dataset folder name into an identity.
///
/// Lenient policy: anything other than exactly two `_`-separated fields
/// keeps the whole folder name as the display name and gets the sentinel
/// id. Returns `true` in the second slot when the fallback was taken.
pub fn identity_from_folder(folder: &str) -> (Identity, bool) {
    let mut parts = folder.split('_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(id), None) if !name.is_empty() && !id.is_empty() => {
            (Identity::new(name, id), false)
        }
        _ => (Identity::new(folder, FALLBACK_ID), true),
    }
}

/// Walk the dataset and build the encoding store.
///
/// Directories and files are processed in sorted order so the resulting
/// entry order (the matcher tie-break) is deterministic across runs.
pub fn encode_directory(
    extractor: &mut dyn Extractor,
    dataset_root: &Path,
) -> Result<EncodingStore, EnrollError> {
    if !dataset_root.is_dir() {
        return Err(EnrollError::DatasetMissing(dataset_root.to_path_buf()));
    }

    let mut folders: Vec<PathBuf> = std::fs::read_dir(dataset_root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();

    let mut store = EncodingStore::new();

    for folder in &folders {
        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (identity, fallback) = identity_from_folder(&folder_name);
        if fallback {
            tracing::warn!(
                folder = %folder_name,
                "folder name is not <name>_<id>; using folder name with sentinel id"
            );
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(folder)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_enrollment_image(p))
            .collect();
        images.sort();

        let before = store.len();
        for image_path in &images {
            encode_image(extractor, &identity, image_path, &mut store);
        }

        tracing::info!(
            name = %identity.name,
            id = %identity.id,
            images = images.len(),
            entries = store.len() - before,
            "enrolled folder"
        );
    }

    Ok(store)
}

fn is_enrollment_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("png"))
}

/// Encode one image. Never propagates: a bad image costs its own entries
/// only, not the enrollment run.
fn encode_image(
    extractor: &mut dyn Extractor,
    identity: &Identity,
    path: &Path,
    store: &mut EncodingStore,
) {
    let image = match image::open(path) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable image skipped");
            return;
        }
    };

    let (width, height) = image.dimensions();
    let faces = match extractor.detect_and_embed(image.as_raw(), width, height) {
        Ok(faces) => faces,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "extraction failed, image skipped");
            return;
        }
    };

    if faces.is_empty() {
        tracing::debug!(path = %path.display(), "no face detected, image skipped");
        return;
    }

    for (_, embedding) in faces {
        store.push(identity.clone(), embedding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractorError;
    use crate::types::{BoundingBox, Embedding};
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    /// One face per non-black image, embedding derived from the first
    /// pixel; all-black images have no detectable face.
    struct StubExtractor;

    impl Extractor for StubExtractor {
        fn detect_and_embed(
            &mut self,
            frame: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<(BoundingBox, Embedding)>, ExtractorError> {
            if frame.iter().all(|&p| p == 0) {
                return Ok(vec![]);
            }
            let level = frame[0] as f32 / 255.0;
            Ok(vec![(
                BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                    confidence: 0.9,
                },
                Embedding::new(vec![level; 4]),
            )])
        }
    }

    fn write_gray(path: &Path, level: u8) {
        GrayImage::from_pixel(8, 8, Luma([level])).save(path).unwrap();
    }

    #[test]
    fn folder_name_parses_name_and_id() {
        let (identity, fallback) = identity_from_folder("Nikhil_101");
        assert_eq!(identity, Identity::new("Nikhil", "101"));
        assert!(!fallback);
    }

    #[test]
    fn malformed_folder_name_degrades_to_sentinel() {
        for folder in ["JustAName", "Too_Many_Parts", "_101", "Nikhil_", ""] {
            let (identity, fallback) = identity_from_folder(folder);
            assert!(fallback, "{folder:?} should fall back");
            assert_eq!(identity.name, folder);
            assert_eq!(identity.id, FALLBACK_ID);
        }
    }

    #[test]
    fn encodes_one_entry_per_face() {
        let dir = tempdir().unwrap();
        let alice = dir.path().join("Alice_101");
        std::fs::create_dir(&alice).unwrap();
        write_gray(&alice.join("a.png"), 100);
        write_gray(&alice.join("b.jpg"), 150);

        let store = encode_directory(&mut StubExtractor, dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        for entry in store.entries() {
            assert_eq!(entry.identity, Identity::new("Alice", "101"));
        }
    }

    #[test]
    fn no_face_images_contribute_nothing() {
        let dir = tempdir().unwrap();
        let alice = dir.path().join("Alice_101");
        std::fs::create_dir(&alice).unwrap();
        write_gray(&alice.join("dark.png"), 0);
        write_gray(&alice.join("ok.png"), 100);

        let store = encode_directory(&mut StubExtractor, dir.path()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn non_image_files_and_unreadable_images_are_skipped() {
        let dir = tempdir().unwrap();
        let alice = dir.path().join("Alice_101");
        std::fs::create_dir(&alice).unwrap();
        write_gray(&alice.join("ok.png"), 100);
        std::fs::write(alice.join("notes.txt"), "not an image").unwrap();
        std::fs::write(alice.join("broken.png"), "not a png").unwrap();

        let store = encode_directory(&mut StubExtractor, dir.path()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn malformed_folder_still_enrolls() {
        let dir = tempdir().unwrap();
        let odd = dir.path().join("JustAName");
        std::fs::create_dir(&odd).unwrap();
        write_gray(&odd.join("a.png"), 80);

        let store = encode_directory(&mut StubExtractor, dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].identity, Identity::new("JustAName", FALLBACK_ID));
    }

    #[test]
    fn folders_enroll_in_sorted_order() {
        let dir = tempdir().unwrap();
        for (folder, level) in [("Zoe_103", 90u8), ("Alice_101", 100), ("Bob_102", 110)] {
            let p = dir.path().join(folder);
            std::fs::create_dir(&p).unwrap();
            write_gray(&p.join("a.png"), level);
        }

        let store = encode_directory(&mut StubExtractor, dir.path()).unwrap();
        let ids: Vec<&str> = store.entries().iter().map(|e| e.identity.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "103"]);
    }

    #[test]
    fn missing_dataset_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = encode_directory(&mut StubExtractor, &dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, EnrollError::DatasetMissing(_)));
    }
}
