//! Interactive enrollment image capture.
//!
//! Saves face crops from the live camera into the dataset folder for one
//! person, ready for `rollcall enroll`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::GrayImage;
use rollcall_core::OnnxExtractor;
use rollcall_hw::Camera;

use crate::config::Config;

pub fn run(config: &Config, name: Option<String>, id: Option<String>) -> Result<()> {
    let name = match name {
        Some(n) => n,
        None => crate::prompt("Enter user name (e.g. Nikhil): ")?,
    };
    let id = match id {
        Some(i) => i,
        None => crate::prompt("Enter user id (e.g. 101): ")?,
    };

    let folder = config.dataset_dir.join(format!("{name}_{id}"));
    if folder.exists() {
        tracing::info!(path = %folder.display(), "folder exists, appending new images");
    } else {
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create {}", folder.display()))?;
        tracing::info!(path = %folder.display(), "created dataset folder");
    }

    let mut extractor =
        OnnxExtractor::load(&config.detector_model_path(), &config.embedder_model_path())?;
    let camera = Camera::open(&config.camera_device)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    tracing::info!(
        count = config.capture_count,
        "capture started; look at the camera, Ctrl-C quits early"
    );

    let mut saved = 0usize;
    while running.load(Ordering::SeqCst) && saved < config.capture_count {
        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "camera read failed, stopping");
                break;
            }
        };

        let faces = match extractor.detect(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "detection failed for this frame");
                continue;
            }
        };

        for face in &faces {
            if saved >= config.capture_count {
                break;
            }
            let Some(crop) = frame.crop(
                face.x.round() as i64,
                face.y.round() as i64,
                face.width.round().max(1.0) as u32,
                face.height.round().max(1.0) as u32,
            ) else {
                continue;
            };

            saved += 1;
            let path = folder.join(format!("{name}.{id}.{saved}.jpg"));
            let img = GrayImage::from_raw(crop.width, crop.height, crop.data)
                .context("face crop has inconsistent dimensions")?;
            img.save(&path)
                .with_context(|| format!("failed to save {}", path.display()))?;

            tracing::info!(
                saved,
                total = config.capture_count,
                path = %path.display(),
                "saved face image"
            );
        }
    }

    println!("Captured {saved} face images into {}", folder.display());
    Ok(())
}
