use crate::encoder::{EncodeError, FaceEncoder};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{DimensionMismatch, Gallery, MatchResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("No face found in the image")]
    NoFaceFound,
    #[error(transparent)]
    DimensionMismatch(#[from] DimensionMismatch),
    #[error(transparent)]
    Extraction(#[from] EncodeError),
}

/// Identify the first face in `image` against `gallery`.
///
/// An image without a face is an error; an empty gallery is not, it simply
/// never matches.
pub fn recognize<E: FaceEncoder + ?Sized>(
    encoder: &mut E,
    image: &[u8],
    gallery: &Gallery,
    threshold: f32,
) -> Result<MatchResult, RecognizeError> {
    let probe = encoder.encode(image)?.ok_or(RecognizeError::NoFaceFound)?;
    let result = EuclideanMatcher.compare(&probe, gallery, threshold)?;

    tracing::debug!(
        identity = result.label(),
        distance = ?result.distance,
        threshold,
        gallery = gallery.len(),
        "recognition complete"
    );
    Ok(result)
}
