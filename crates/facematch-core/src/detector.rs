//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the 3-stride anchor-free SCRFD model on an RGB photo, decodes boxes
//! and five-point landmarks, and suppresses overlapping detections.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Output tensor indices for one stride: (score, bbox, kps).
type LevelOutputs = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Output indices for strides 8, 16 and 32, resolved once at load time.
    levels: [LevelOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model with landmarks has 9 outputs, got {}",
                output_names.len()
            )));
        }

        let levels = resolve_levels(&output_names);
        tracing::debug!(?levels, "SCRFD output mapping");

        Ok(Self { session, levels })
    }

    /// Detect faces, most confident first. Coordinates are in `image` pixels.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, scale) = preprocess(image);
        let levels = self.levels;
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, (score_idx, bbox_idx, kps_idx)) in SCRFD_STRIDES.iter().zip(levels) {
            let tensor = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                    })
            };
            let level = LevelTensors {
                scores: tensor(score_idx, "scores")?,
                bboxes: tensor(bbox_idx, "bboxes")?,
                kps: tensor(kps_idx, "kps")?,
            };
            decode_level(&level, stride, scale, SCRFD_CONFIDENCE_THRESHOLD, &mut candidates);
        }

        Ok(suppress_overlaps(candidates, SCRFD_NMS_THRESHOLD))
    }
}

/// Resize to fit the model input (top-left anchored, padded with the mean)
/// and normalize into an NCHW RGB tensor. Returns the resize scale.
fn preprocess(image: &RgbImage) -> (Array4<f32>, f32) {
    let (width, height) = image.dimensions();
    let scale = (SCRFD_INPUT_SIZE as f32 / width as f32).min(SCRFD_INPUT_SIZE as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    // Zero is the normalized mean, so untouched cells act as padding.
    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, scale)
}

/// Find (score, bbox, kps) outputs by name ("score_8", "bbox_16", ...).
///
/// Exports with numeric tensor names use the standard positional layout:
/// scores at 0-2, bboxes at 3-5, landmarks at 6-8.
fn resolve_levels(names: &[String]) -> [LevelOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let named: Option<Vec<LevelOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((position("score", s)?, position("bbox", s)?, position("kps", s)?)))
        .collect();

    match named {
        Some(levels) => [levels[0], levels[1], levels[2]],
        None => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

struct LevelTensors<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

/// Decode one stride level, mapping coordinates back to the source image.
fn decode_level(
    level: &LevelTensors<'_>,
    stride: usize,
    scale: f32,
    threshold: f32,
    out: &mut Vec<BoundingBox>,
) {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    for idx in 0..anchors.min(level.scores.len()) {
        let score = level.scores[idx];
        if score <= threshold {
            continue;
        }
        let Some(d) = level.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let cx = (cell % grid_w) as f32 * step;
        let cy = (cell / grid_w) as f32 * step;

        let x1 = (cx - d[0] * step) / scale;
        let y1 = (cy - d[1] * step) / scale;
        let x2 = (cx + d[2] * step) / scale;
        let y2 = (cy + d[3] * step) / scale;

        let landmarks = level.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                (
                    (cx + k[i * 2] * step) / scale,
                    (cy + k[i * 2 + 1] * step) / scale,
                )
            })
        });

        out.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }
}

/// Greedy non-maximum suppression. Output is sorted by confidence, descending.
fn suppress_overlaps(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, landmarks: None,
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = suppress_overlaps(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(suppress_overlaps(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_preprocess_scale_and_padding() {
        let image = RgbImage::from_pixel(320, 160, image::Rgb([255, 0, 128]));
        let (tensor, scale) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE]);
        assert!((scale - 2.0).abs() < 1e-6);

        // Inside the resized region: per-channel values survive
        let r = tensor[[0, 0, 10, 10]];
        let g = tensor[[0, 1, 10, 10]];
        assert!((r - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);
        assert!((g - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-3);

        // Below the 320-row resized region: padding
        assert_eq!(tensor[[0, 0, 500, 10]], 0.0);
    }

    #[test]
    fn test_decode_level_maps_back_to_source() {
        let stride = 32;
        let cells = (SCRFD_INPUT_SIZE / stride) * (SCRFD_INPUT_SIZE / stride);
        let mut scores = vec![0.0f32; cells * SCRFD_ANCHORS_PER_CELL];
        let mut bboxes = vec![0.0f32; scores.len() * 4];
        let kps = vec![0.0f32; scores.len() * 10];

        // Anchor in cell (x=1, y=0): center (32, 0) in model space
        let idx = 2;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);

        let level = LevelTensors { scores: &scores, bboxes: &bboxes, kps: &kps };
        let mut out = Vec::new();
        decode_level(&level, stride, 2.0, 0.5, &mut out);

        assert_eq!(out.len(), 1);
        let face = &out[0];
        assert!((face.x - 8.0).abs() < 1e-4, "x = {}", face.x);
        assert!((face.y - 0.0).abs() < 1e-4);
        assert!((face.width - 16.0).abs() < 1e-4);
        assert!((face.height - 16.0).abs() < 1e-4);
        let landmarks = face.landmarks.unwrap();
        assert!((landmarks[0].0 - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_resolve_levels_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        let levels = resolve_levels(&names);
        assert_eq!(levels, [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_resolve_levels_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (448 + i).to_string()).collect();
        assert_eq!(resolve_levels(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_missing_model() {
        let err = FaceDetector::load(Path::new("/nonexistent/det_10g.onnx")).err().unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
