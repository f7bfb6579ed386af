use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP service listens on (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Directory of labelled reference photos (default: /app/images).
    pub gallery_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Upper bound in seconds on one recognition, embedding extraction included.
    pub request_timeout_secs: u64,
    /// Number of engine threads, each with its own model sessions.
    pub workers: usize,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

const DEFAULT_BIND: &str = "0.0.0.0:5000";
const DEFAULT_GALLERY_DIR: &str = "/app/images";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup; unset or unusable values fall
    /// back to their defaults.
    ///
    /// A zero timeout or a negative threshold counts as unusable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("FACEMATCH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facematch_core::default_model_dir);

        Self {
            bind_addr: lookup("FACEMATCH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            gallery_dir: lookup("FACEMATCH_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GALLERY_DIR)),
            model_dir,
            match_threshold: parse_f32(lookup("FACEMATCH_MATCH_THRESHOLD"))
                .filter(|v| *v >= 0.0)
                .unwrap_or(facematch_core::DEFAULT_MATCH_THRESHOLD),
            request_timeout_secs: parse::<u64>(lookup("FACEMATCH_REQUEST_TIMEOUT_SECS"))
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            workers: parse::<usize>(lookup("FACEMATCH_WORKERS"))
                .unwrap_or(DEFAULT_WORKERS)
                .max(1),
            max_upload_bytes: parse::<usize>(lookup("FACEMATCH_MAX_UPLOAD_BYTES"))
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_f32(raw: Option<String>) -> Option<f32> {
    parse::<f32>(raw).filter(|v| v.is_finite())
}

fn parse<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|v| v.trim().parse().ok())
}
