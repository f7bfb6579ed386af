//! Nearest-neighbour matching of a query embedding against a gallery.

use crate::types::{DimensionMismatch, Embedding, Gallery, MatchResult};

/// Canonical maximum Euclidean distance for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

/// Strategy for comparing a probe embedding against a gallery of reference faces.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, DimensionMismatch>;
}

/// Brute-force 1-NN under Euclidean distance.
///
/// Every entry is scanned, so cost grows linearly with the gallery. That is
/// fine for tens to low thousands of faces; larger galleries need an index.
/// Ties keep the earliest entry in gallery order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, DimensionMismatch> {
        let Some(expected) = gallery.dimension() else {
            return Ok(MatchResult::no_match(None));
        };
        if probe.dimension() != expected {
            return Err(DimensionMismatch {
                expected,
                actual: probe.dimension(),
            });
        }

        let mut best: Option<(usize, f32)> = None;
        for (i, entry) in gallery.entries().iter().enumerate() {
            let distance = probe.euclidean_distance(&entry.embedding)?;
            if distance.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        let result = match best {
            Some((idx, distance)) if distance <= threshold => MatchResult {
                identity: Some(gallery.entries()[idx].identity.clone()),
                distance: Some(distance),
            },
            Some((_, distance)) => MatchResult::no_match(Some(distance)),
            None => MatchResult::no_match(None),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GalleryEntry, NO_MATCH_LABEL};

    fn gallery(entries: &[(&str, Vec<f32>)]) -> Gallery {
        Gallery::from_entries(
            entries
                .iter()
                .map(|(identity, values)| GalleryEntry {
                    identity: identity.to_string(),
                    embedding: Embedding::new(values.clone()),
                })
                .collect(),
        )
        .unwrap()
    }

    fn harry_and_hermione() -> Gallery {
        gallery(&[("harry", vec![0.0, 0.0, 0.0]), ("hermione", vec![2.0, 0.0, 0.0])])
    }

    #[test]
    fn test_close_query_matches_nearest() {
        let probe = Embedding::new(vec![0.1, 0.0, 0.0]);
        let result = EuclideanMatcher
            .compare(&probe, &harry_and_hermione(), DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert_eq!(result.identity.as_deref(), Some("harry"));
        assert!((result.distance.unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_far_query_is_rejected_but_reports_distance() {
        // 0.9 from both entries
        let g = gallery(&[("harry", vec![0.0, 0.0]), ("hermione", vec![1.8, 0.0])]);
        let probe = Embedding::new(vec![0.9, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &g, 0.8).unwrap();
        assert_eq!(result.label(), NO_MATCH_LABEL);
        assert!((result.distance.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_distance_above_threshold_never_matches() {
        let g = harry_and_hermione();
        let probe = Embedding::new(vec![0.0, 0.5, 0.0]);
        for step in 0..=20 {
            let threshold = step as f32 * 0.05;
            let result = EuclideanMatcher.compare(&probe, &g, threshold).unwrap();
            let distance = result.distance.unwrap();
            if distance > threshold {
                assert!(!result.is_match(), "threshold {threshold}, distance {distance}");
            } else {
                assert_eq!(result.identity.as_deref(), Some("harry"));
            }
        }
    }

    #[test]
    fn test_exact_embedding_matches_at_zero_threshold() {
        let probe = Embedding::new(vec![2.0, 0.0, 0.0]);
        let result = EuclideanMatcher
            .compare(&probe, &harry_and_hermione(), 0.0)
            .unwrap();
        assert_eq!(result.identity.as_deref(), Some("hermione"));
        assert_eq!(result.distance, Some(0.0));
    }

    #[test]
    fn test_tie_keeps_first_entry() {
        let g = gallery(&[("left", vec![-1.0, 0.0]), ("right", vec![1.0, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &g, 2.0).unwrap();
        assert_eq!(result.identity.as_deref(), Some("left"));
    }

    #[test]
    fn test_scans_every_entry() {
        // Best match is the last entry
        let g = gallery(&[
            ("decoy1", vec![0.0, 1.0, 0.0]),
            ("decoy2", vec![0.0, 0.0, 1.0]),
            ("match", vec![1.0, 0.0, 0.0]),
        ]);
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &g, 0.5).unwrap();
        assert_eq!(result.identity.as_deref(), Some("match"));
    }

    #[test]
    fn test_empty_gallery_is_no_match() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher
            .compare(&probe, &Gallery::empty(), DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert_eq!(result, MatchResult::no_match(None));
    }

    #[test]
    fn test_dimension_mismatch() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let err = EuclideanMatcher
            .compare(&probe, &harry_and_hermione(), DEFAULT_MATCH_THRESHOLD)
            .unwrap_err();
        assert_eq!(err, DimensionMismatch { expected: 3, actual: 2 });
    }

    #[test]
    fn test_deserialized_gallery_never_mixes_dimensions() {
        let json = serde_json::json!({
            "entries": [
                { "identity": "harry", "embedding": { "values": [0.0, 0.0], "model_version": null } },
                { "identity": "ron", "embedding": { "values": [5.0, 5.0, 0.0], "model_version": null } },
            ],
            "source_dir": null,
            "built_at": "2024-01-01T00:00:00Z",
        });
        assert!(serde_json::from_value::<Gallery>(json).is_err());

        // A consistent gallery still refuses a probe of another dimension.
        let g = gallery(&[("harry", vec![0.0, 0.0]), ("ron", vec![5.0, 5.0])]);
        let probe = Embedding::new(vec![5.0, 5.0, 0.0]);
        let err = EuclideanMatcher.compare(&probe, &g, 0.8).unwrap_err();
        assert_eq!(err, DimensionMismatch { expected: 2, actual: 3 });
    }

    #[test]
    fn test_nan_distances_are_skipped() {
        let g = gallery(&[("broken", vec![f32::NAN, 0.0]), ("ok", vec![0.2, 0.0])]);
        let probe = Embedding::new(vec![0.0, 0.0]);
        let result = EuclideanMatcher.compare(&probe, &g, 0.8).unwrap();
        assert_eq!(result.identity.as_deref(), Some("ok"));
    }
}
