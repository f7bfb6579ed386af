use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identity reported when the nearest gallery entry is farther than the threshold.
pub const NO_MATCH_LABEL: &str = "No match found";

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean (L2) distance; embeddings of different dimension are refused.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, DimensionMismatch> {
        if self.dimension() != other.dimension() {
            return Err(DimensionMismatch {
                expected: self.dimension(),
                actual: other.dimension(),
            });
        }
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("embedding dimension mismatch: expected {expected}, got {actual}")]
pub struct DimensionMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// A known reference face. `identity` is the source image's file stem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub identity: String,
    pub embedding: Embedding,
}

/// Ordered collection of reference faces searched at query time.
///
/// All entries share one embedding dimension, fixed by the first entry.
/// A gallery is never modified after it is built; reloading produces a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredGallery")]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    source_dir: Option<PathBuf>,
    built_at: DateTime<Utc>,
}

/// Serialized form of [`Gallery`], re-validated on load.
#[derive(Deserialize)]
struct StoredGallery {
    entries: Vec<GalleryEntry>,
    source_dir: Option<PathBuf>,
    built_at: DateTime<Utc>,
}

impl TryFrom<StoredGallery> for Gallery {
    type Error = DimensionMismatch;

    fn try_from(stored: StoredGallery) -> Result<Self, Self::Error> {
        let mut gallery = Self::from_entries(stored.entries)?;
        gallery.source_dir = stored.source_dir;
        gallery.built_at = stored.built_at;
        Ok(gallery)
    }
}

impl Gallery {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            source_dir: None,
            built_at: Utc::now(),
        }
    }

    /// Build a gallery from in-memory entries, rejecting mixed dimensions.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Result<Self, DimensionMismatch> {
        let mut gallery = Self::empty();
        for entry in entries {
            gallery.push(entry)?;
        }
        Ok(gallery)
    }

    pub(crate) fn with_source_dir(mut self, dir: &Path) -> Self {
        self.source_dir = Some(dir.to_path_buf());
        self
    }

    pub(crate) fn push(&mut self, entry: GalleryEntry) -> Result<(), DimensionMismatch> {
        if let Some(expected) = self.dimension() {
            let actual = entry.embedding.dimension();
            if actual != expected {
                return Err(DimensionMismatch { expected, actual });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension shared by every entry, `None` for an empty gallery.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dimension())
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

impl Default for Gallery {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of matching one query against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Identity of the accepted entry, `None` when nothing is close enough.
    pub identity: Option<String>,
    /// Distance to the nearest entry; reported even when it was rejected.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn no_match(distance: Option<f32>) -> Self {
        Self {
            identity: None,
            distance,
        }
    }

    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    /// Identity to show the caller, or [`NO_MATCH_LABEL`].
    pub fn label(&self) -> &str {
        self.identity.as_deref().unwrap_or(NO_MATCH_LABEL)
    }
}
