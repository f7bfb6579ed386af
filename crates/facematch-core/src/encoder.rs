//! The embedding-extraction seam.
//!
//! Matching logic only sees [`FaceEncoder`]; the ONNX pipeline is one
//! implementation of it and tests substitute synthetic embeddings.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("unreadable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("{0}")]
    Other(String),
}

/// Converts encoded image bytes into a face embedding.
pub trait FaceEncoder {
    /// Embedding of the first detected face, or `None` when the image contains no face.
    fn encode(&mut self, image: &[u8]) -> Result<Option<Embedding>, EncodeError>;
}

impl<E: FaceEncoder + ?Sized> FaceEncoder for Box<E> {
    fn encode(&mut self, image: &[u8]) -> Result<Option<Embedding>, EncodeError> {
        (**self).encode(image)
    }
}

/// SCRFD + ArcFace encoder: decode, detect, align the most confident face, embed.
pub struct OnnxEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEncoder {
    pub fn load(detector_path: &Path, recognizer_path: &Path) -> Result<Self, EncodeError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }

    /// Load both models from their conventional file names in `model_dir`.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self, EncodeError> {
        Self::load(
            &model_dir.join(DETECTOR_MODEL_FILE),
            &model_dir.join(RECOGNIZER_MODEL_FILE),
        )
    }
}

impl FaceEncoder for OnnxEncoder {
    fn encode(&mut self, image: &[u8]) -> Result<Option<Embedding>, EncodeError> {
        let rgb = image::load_from_memory(image)?.to_rgb8();
        let faces = self.detector.detect(&rgb)?;
        let Some(face) = faces.first() else {
            tracing::debug!(
                width = rgb.width(),
                height = rgb.height(),
                "no face detected"
            );
            return Ok(None);
        };
        tracing::debug!(
            faces = faces.len(),
            confidence = face.confidence,
            "using most confident face"
        );
        let embedding = self.recognizer.extract(&rgb, face)?;
        Ok(Some(embedding))
    }
}
