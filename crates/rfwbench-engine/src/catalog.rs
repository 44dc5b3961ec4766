//! Known detector and recognition models, and their decision thresholds.

use rfwbench_core::{DetectorId, DistanceMetric, ModelId};
use std::path::PathBuf;

/// Detector backends: (identifier, ONNX file under the model directory).
const DETECTORS: &[(&str, &str)] = &[("scrfd", "det_10g.onnx"), ("scrfd_500m", "det_500m.onnx")];

/// Recognition models with their thresholds for each metric.
const RECOGNIZERS: &[(&str, &str, Thresholds)] = &[
    (
        "ArcFace",
        "w600k_r50.onnx",
        Thresholds {
            cosine: 0.68,
            euclidean: 4.15,
            euclidean_l2: 1.13,
        },
    ),
    (
        "ArcFace-MobileFaceNet",
        "w600k_mbf.onnx",
        Thresholds {
            cosine: 0.68,
            euclidean: 4.15,
            euclidean_l2: 1.13,
        },
    ),
];

/// Largest distance still judged "same person", per metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cosine: f32,
    pub euclidean: f32,
    pub euclidean_l2: f32,
}

impl Thresholds {
    pub fn for_metric(&self, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => self.cosine,
            DistanceMetric::Euclidean => self.euclidean,
            DistanceMetric::EuclideanL2 => self.euclidean_l2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    model_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// ONNX file for a detector id (case-insensitive).
    pub fn detector_path(&self, id: &DetectorId) -> Option<PathBuf> {
        DETECTORS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(id.as_str()))
            .map(|(_, file)| self.model_dir.join(file))
    }

    /// ONNX file and thresholds for a recognition model id (case-insensitive).
    pub fn recognizer(&self, id: &ModelId) -> Option<(PathBuf, Thresholds)> {
        RECOGNIZERS
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(id.as_str()))
            .map(|(_, file, thresholds)| (self.model_dir.join(file), *thresholds))
    }

    pub fn detector_ids() -> impl Iterator<Item = &'static str> {
        DETECTORS.iter().map(|(name, _)| *name)
    }

    pub fn model_ids() -> impl Iterator<Item = &'static str> {
        RECOGNIZERS.iter().map(|(name, _, _)| *name)
    }
}
