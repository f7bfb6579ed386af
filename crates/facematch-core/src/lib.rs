//! facematch-core — reference gallery and face matching engine.
//!
//! Builds a gallery of labelled face embeddings, then answers "who is this?"
//! with a Euclidean nearest-neighbour search and a distance threshold.
//! Embeddings come from a [`FaceEncoder`]; the bundled one runs SCRFD
//! detection and ArcFace recognition via ONNX Runtime.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod recognize;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use encoder::{EncodeError, FaceEncoder, OnnxEncoder};
pub use gallery::build_gallery;
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use recognize::{recognize, RecognizeError};
pub use types::{BoundingBox, DimensionMismatch, Embedding, Gallery, GalleryEntry, MatchResult, NO_MATCH_LABEL};

/// Default ONNX model directory: `$XDG_DATA_HOME/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch/models")
}
