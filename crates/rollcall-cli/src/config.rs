use std::path::PathBuf;

use rollcall_core::DEFAULT_TOLERANCE;

/// Runtime configuration, loaded from `ROLLCALL_*` environment variables
/// with defaults under the XDG data directory.
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Encoding store file.
    pub store_path: PathBuf,
    /// Directory for the per-date attendance CSV files.
    pub reports_dir: PathBuf,
    /// Enrollment dataset root (`<name>_<id>` folders).
    pub dataset_dir: PathBuf,
    /// Matcher distance tolerance; lower is stricter.
    pub tolerance: f32,
    /// Optional TOML file describing the feedback panel wiring.
    pub feedback_config: Option<PathBuf>,
    /// Face images captured per person by `rollcall capture`.
    pub capture_count: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/usr/share/rollcall/models")),
            store_path: std::env::var("ROLLCALL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("face_encodings.json")),
            reports_dir: std::env::var("ROLLCALL_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("attendance_reports")),
            dataset_dir: std::env::var("ROLLCALL_DATASET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("dataset")),
            tolerance: env_f32("ROLLCALL_TOLERANCE", DEFAULT_TOLERANCE),
            feedback_config: std::env::var("ROLLCALL_FEEDBACK_CONFIG").ok().map(PathBuf::from),
            capture_count: env_usize("ROLLCALL_CAPTURE_COUNT", 30),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir.join("face_det.onnx").to_string_lossy().into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir.join("face_emb.onnx").to_string_lossy().into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
