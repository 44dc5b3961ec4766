//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the 3-stride anchor-based SCRFD head on a letterboxed RGB photo and
//! maps boxes and landmarks back into the photo's own pixel space.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = 9;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("detector inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Placement of a photo inside the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    width: u32,
    height: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, target);
        Self {
            scale,
            pad_x: (target - new_w) / 2,
            pad_y: (target - new_h) / 2,
            width: new_w,
            height: new_h,
        }
    }

    /// Network-input coordinates back to photo coordinates.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// (score, bbox, kps) output positions for one stride.
type StrideOutputIndices = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_path_buf()));
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
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }

    /// Faces in `photo`, highest confidence first.
    pub fn detect(&mut self, photo: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if photo.width() == 0 || photo.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = preprocess(photo);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[slot];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                StrideOutputs { scores, bboxes, kps },
                stride,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = faces.len(), "SCRFD detection done");
        Ok(faces)
    }
}

/// Letterbox `photo` into a normalized 1x3x640x640 tensor. Padding is 0 after
/// normalization.
fn preprocess(photo: &RgbImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(photo.width(), photo.height(), SCRFD_INPUT_SIZE);
    let resized = imageops::resize(photo, letterbox.width, letterbox.height, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = (x + letterbox.pad_x) as usize;
        let ty = (y + letterbox.pad_y) as usize;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }

    (tensor, letterbox)
}

/// Find the stride slots by output name ("score_8", "bbox_16", ...), or fall
/// back to the stock export order: scores 0-2, bboxes 3-5, kps 6-8.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named.as_deref() {
        Some(&[s8, s16, s32]) => [s8, s16, s32],
        _ => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

struct StrideOutputs<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

fn decode_stride(
    out: StrideOutputs<'_>,
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<BoundingBox> {
    let grid_w = SCRFD_INPUT_SIZE as usize / stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / stride;
    let step = stride as f32;

    (0..grid_w * grid_h * SCRFD_ANCHORS_PER_CELL)
        .filter_map(|idx| {
            let score = *out.scores.get(idx)?;
            if score <= threshold {
                return None;
            }
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid_w) as f32 * step;
            let ay = (cell / grid_w) as f32 * step;

            let d = out.bboxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - d[0] * step, ay - d[1] * step);
            let (x2, y2) = letterbox.unmap(ax + d[2] * step, ay + d[3] * step);

            let landmarks = out.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step))
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression. Output is sorted by confidence.
fn nms(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
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
    use approx::assert_abs_diff_eq;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
            landmarks: None,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = nms(
            vec![
                make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
                make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
                make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        let confidences: Vec<f32> = result.iter().map(|b| b.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(Vec::new(), 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape_photo() {
        // 250x125 -> 640x320, centered vertically
        let lb = Letterbox::fit(250, 125, 640);
        assert_eq!((lb.width, lb.height), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));

        let (x, y) = lb.unmap(100.0 * lb.scale, 50.0 * lb.scale + 160.0);
        assert_abs_diff_eq!(x, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let photo = RgbImage::from_pixel(100, 50, image::Rgb([255, 255, 255]));
        let (tensor, lb) = preprocess(&photo);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = tensor[[0, 1, lb.pad_y as usize + 10, 10]];
        assert_abs_diff_eq!(inside, (255.0 - SCRFD_MEAN) / SCRFD_STD, epsilon = 1e-3);
    }

    #[test]
    fn test_decode_stride_anchor_and_threshold() {
        // Stride 32 grid is 20x20 with 2 anchors per cell. Anchor 3 sits at cell 1 (x=32, y=0).
        let cells = 20 * 20 * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0; cells];
        scores[3] = 0.9;
        scores[5] = 0.4;
        let mut bboxes = vec![0.0; cells * 4];
        bboxes[12..16].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);
        let kps = vec![0.0; cells * 10];

        let identity = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
            width: 640,
            height: 640,
        };
        let faces = decode_stride(StrideOutputs { scores: &scores, bboxes: &bboxes, kps: &kps }, 32, &identity, 0.5);

        assert_eq!(faces.len(), 1);
        let face = &faces[0];
        assert_abs_diff_eq!(face.x, 16.0);
        assert_abs_diff_eq!(face.y, 0.0);
        assert_abs_diff_eq!(face.width, 32.0);
        assert_abs_diff_eq!(face.height, 32.0);
        assert_eq!(face.landmarks, Some([(32.0, 0.0); 5]));
    }

    #[test]
    fn test_decode_stride_truncated_outputs() {
        let scores = vec![0.9; 4];
        let faces = decode_stride(StrideOutputs { scores: &scores, bboxes: &[], kps: &[] }, 32, &Letterbox::fit(640, 640, 640), 0.5);
        assert!(faces.is_empty());
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let indices = discover_output_indices(&names(&[
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32", "score_32",
        ]));
        assert_eq!(indices, [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let numeric: Vec<String> = (440..449).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&numeric), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }
}
