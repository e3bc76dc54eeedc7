//! The live attendance loop: capture, match, mark, feedback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use rollcall_core::{
    CsvTableStore, EncodingStore, EuclideanMatcher, Extractor, Ledger, MarkOutcome, Matcher,
    OnnxExtractor,
};
use rollcall_hw::{Camera, FeedbackConfig, FeedbackPanel};

use crate::config::Config;

pub fn run(config: &Config, lecture: Option<String>) -> Result<()> {
    // Fatal at startup: a missing or corrupt store aborts before any
    // hardware is touched. The error text tells the operator to enroll.
    let store = EncodingStore::load(&config.store_path)?;
    if store.is_empty() {
        tracing::warn!("encoding store is empty; every face will be unknown");
    }

    let lecture = match lecture {
        Some(l) => l,
        None => crate::prompt("Enter lecture name (e.g. Math_101): ")?,
    };

    let mut extractor =
        OnnxExtractor::load(&config.detector_model_path(), &config.embedder_model_path())?;
    let camera = Camera::open(&config.camera_device)?;

    let feedback_config = match &config.feedback_config {
        Some(path) => FeedbackConfig::from_toml_file(path)?,
        None => FeedbackConfig::default(),
    };
    let mut panel = FeedbackPanel::init(&feedback_config)?;

    let ledger = Ledger::new(CsvTableStore::new(&config.reports_dir));
    let matcher = EuclideanMatcher;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install interrupt handler")?;
    }

    panel.display_message("System Ready", &format!("Lec: {lecture}"));
    tracing::info!(%lecture, device = %camera.device_path, "attendance loop started; Ctrl-C stops");

    while running.load(Ordering::SeqCst) {
        // Camera read failure stops the loop cleanly; the panel teardown
        // below still runs.
        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "camera read failed, stopping");
                break;
            }
        };

        // A bad frame costs one loop turn, never the session.
        let faces = match extractor.detect_and_embed(&frame.data, frame.width, frame.height) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "extraction failed for this frame");
                continue;
            }
        };

        // Faces are independent: each runs match -> mark -> feedback on
        // its own, sharing only the read-only store and the ledger.
        for (_, embedding) in &faces {
            let result = matcher.compare(embedding, store.entries(), config.tolerance);

            let Some(identity) = result.identity else {
                tracing::debug!(distance = result.distance, "unknown face");
                panel.display_message("Unknown Face", "Access Denied");
                continue;
            };

            match ledger.mark(&identity, &lecture) {
                Ok(MarkOutcome::Recorded) => {
                    tracing::info!(name = %identity.name, id = %identity.id, "marked");
                    panel.display_message(&format!("Welcome {}", identity.name), "Marked: Success");
                    panel.buzz_success();
                }
                Ok(MarkOutcome::AlreadyPresent) => {
                    panel.display_message(&format!("Hi {}", identity.name), "Already Marked");
                }
                Err(e) => {
                    tracing::error!(error = %e, id = %identity.id, "ledger write failed");
                    panel.display_message("Mark Failed", "Check Storage");
                    panel.buzz_error();
                }
            }
        }
    }

    tracing::info!("attendance loop stopped");
    panel.cleanup();
    Ok(())
}
