//! Photo-pair verification: detect, align, embed, compare.

use crate::catalog::{ModelCatalog, Thresholds};
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use rfwbench_core::{
    DetectorId, DistanceMetric, ModelId, Verdict, VerificationFailure, Verifier, VerifyRequest,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metric used when the request leaves it open.
pub const DEFAULT_DISTANCE_METRIC: DistanceMetric = DistanceMetric::Cosine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported detector backend: {0}")]
    UnsupportedDetector(String),
    #[error("unsupported recognition model: {0}")]
    UnsupportedModel(String),
    #[error("failed to read image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face detected in {}", .0.display())]
    NoFaceDetected(PathBuf),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

struct LoadedRecognizer {
    recognizer: FaceRecognizer,
    thresholds: Thresholds,
}

/// ONNX-backed [`Verifier`]. Models load on first use and stay resident.
pub struct FaceVerifier {
    catalog: ModelCatalog,
    threshold_override: Option<f32>,
    detectors: HashMap<String, FaceDetector>,
    recognizers: HashMap<String, LoadedRecognizer>,
}

impl FaceVerifier {
    /// `threshold` replaces the catalog threshold for every model and metric.
    pub fn new(model_dir: impl Into<PathBuf>, threshold: Option<f32>) -> Self {
        Self {
            catalog: ModelCatalog::new(model_dir),
            threshold_override: threshold,
            detectors: HashMap::new(),
            recognizers: HashMap::new(),
        }
    }

    /// Load both models up front so a missing file fails the run before any
    /// pair is attempted.
    pub fn preload(&mut self, model: &ModelId, detector: &DetectorId) -> Result<(), EngineError> {
        self.detector(detector)?;
        self.recognizer(model)?;
        Ok(())
    }

    pub fn compare(&mut self, request: &VerifyRequest<'_>) -> Result<Verdict, EngineError> {
        self.check_supported(request.model, request.detector)?;

        let a = self.embed(request.image_a, request.model, request.detector)?;
        let b = self.embed(request.image_b, request.model, request.detector)?;

        let metric = request.distance_metric.unwrap_or(DEFAULT_DISTANCE_METRIC);
        let threshold = self.threshold(request.model, metric)?;
        let verdict = decide(&a, &b, metric, threshold);

        tracing::trace!(%metric, distance = verdict.distance, threshold, "compared embeddings");
        Ok(verdict)
    }

    /// Embedding of the most confident face in the photo at `path`.
    pub fn embed(&mut self, path: &Path, model: &ModelId, detector: &DetectorId) -> Result<Embedding, EngineError> {
        let photo = load_photo(path)?;

        let faces = self.detector(detector)?.detect(&photo)?;
        let face = faces
            .first()
            .ok_or_else(|| EngineError::NoFaceDetected(path.to_path_buf()))?;
        tracing::trace!(path = %path.display(), faces = faces.len(), confidence = face.confidence, "face found");

        let loaded = self.recognizer(model)?;
        Ok(loaded.recognizer.extract(&photo, face)?)
    }

    fn threshold(&mut self, model: &ModelId, metric: DistanceMetric) -> Result<f32, EngineError> {
        if let Some(threshold) = self.threshold_override {
            return Ok(threshold);
        }
        Ok(self.recognizer(model)?.thresholds.for_metric(metric))
    }

    fn check_supported(&self, model: &ModelId, detector: &DetectorId) -> Result<(), EngineError> {
        if self.catalog.detector_path(detector).is_none() {
            return Err(EngineError::UnsupportedDetector(detector.to_string()));
        }
        if self.catalog.recognizer(model).is_none() {
            return Err(EngineError::UnsupportedModel(model.to_string()));
        }
        Ok(())
    }

    fn detector(&mut self, id: &DetectorId) -> Result<&mut FaceDetector, EngineError> {
        match self.detectors.entry(id.as_str().to_ascii_lowercase()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let path = self
                    .catalog
                    .detector_path(id)
                    .ok_or_else(|| EngineError::UnsupportedDetector(id.to_string()))?;
                Ok(slot.insert(FaceDetector::load(&path)?))
            }
        }
    }

    fn recognizer(&mut self, id: &ModelId) -> Result<&mut LoadedRecognizer, EngineError> {
        match self.recognizers.entry(id.as_str().to_ascii_lowercase()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let (path, thresholds) = self
                    .catalog
                    .recognizer(id)
                    .ok_or_else(|| EngineError::UnsupportedModel(id.to_string()))?;
                let recognizer = FaceRecognizer::load(&path)?;
                Ok(slot.insert(LoadedRecognizer {
                    recognizer,
                    thresholds,
                }))
            }
        }
    }
}

impl Verifier for FaceVerifier {
    fn verify(&mut self, request: &VerifyRequest<'_>) -> Result<Verdict, VerificationFailure> {
        self.compare(request)
            .map_err(|e| VerificationFailure::new(e.to_string()))
    }
}

/// Same person iff the embeddings are no further apart than `threshold`.
fn decide(a: &Embedding, b: &Embedding, metric: DistanceMetric, threshold: f32) -> Verdict {
    let distance = a.distance(b, metric);
    Verdict {
        verified: distance <= threshold,
        distance,
        threshold,
    }
}

fn load_photo(path: &Path) -> Result<RgbImage, EngineError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| EngineError::Image {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(a: &'a Path, b: &'a Path, model: &'a ModelId, detector: &'a DetectorId) -> VerifyRequest<'a> {
        VerifyRequest {
            image_a: a,
            image_b: b,
            model,
            detector,
            distance_metric: None,
        }
    }

    #[test]
    fn test_unsupported_ids_rejected_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut verifier = FaceVerifier::new(dir.path(), None);
        let missing = dir.path().join("nope.jpg");
        let model = ModelId::new("ArcFace");

        let err = verifier
            .compare(&request(&missing, &missing, &model, &DetectorId::new("mtcnn")))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedDetector(ref d) if d == "mtcnn"));

        let err = verifier
            .compare(&request(&missing, &missing, &ModelId::new("Facenet"), &DetectorId::new("scrfd")))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedModel(_)));
    }

    #[test]
    fn test_unreadable_image_is_a_verification_failure() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("Alice_0001.jpg");
        std::fs::write(&bogus, b"not a jpeg").unwrap();

        let mut verifier = FaceVerifier::new(dir.path(), None);
        let (model, detector) = (ModelId::new("ArcFace"), DetectorId::new("scrfd"));
        let failure = verifier.verify(&request(&bogus, &bogus, &model, &detector)).unwrap_err();
        assert!(failure.message.contains("Alice_0001.jpg"), "{}", failure.message);
    }

    #[test]
    fn test_preload_reports_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut verifier = FaceVerifier::new(dir.path(), None);
        let err = verifier
            .preload(&ModelId::new("ArcFace"), &DetectorId::new("scrfd"))
            .unwrap_err();
        match err {
            EngineError::Detector(DetectorError::ModelNotFound(path)) => {
                assert_eq!(path, dir.path().join("det_10g.onnx"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Two opposite 512-dim embeddings at typical ArcFace magnitude (norm ~22).
    fn opposite_embeddings() -> (Embedding, Embedding) {
        let a: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let b: Vec<f32> = a.iter().map(|v| -v).collect();
        (Embedding { values: a }, Embedding { values: b })
    }

    #[test]
    fn test_distant_faces_rejected_under_every_metric() {
        let (_, thresholds) = ModelCatalog::new("models").recognizer(&ModelId::new("ArcFace")).unwrap();
        let (a, b) = opposite_embeddings();

        for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean, DistanceMetric::EuclideanL2] {
            let verdict = decide(&a, &b, metric, thresholds.for_metric(metric));
            assert!(!verdict.verified, "{metric}: distance {} accepted", verdict.distance);
        }

        let raw = decide(&a, &b, DistanceMetric::Euclidean, thresholds.euclidean);
        let unit = decide(&a, &b, DistanceMetric::EuclideanL2, thresholds.euclidean_l2);
        assert!(raw.distance > 40.0);
        assert!((unit.distance - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_close_faces_accepted_under_euclidean() {
        let (_, thresholds) = ModelCatalog::new("models").recognizer(&ModelId::new("ArcFace")).unwrap();
        let (a, _) = opposite_embeddings();
        let nudged = Embedding {
            values: a.values.iter().enumerate().map(|(i, v)| if i < 4 { v * 0.5 } else { *v }).collect(),
        };
        // Four components moved by 0.5: distance 1.0
        let verdict = decide(&a, &nudged, DistanceMetric::Euclidean, thresholds.euclidean);
        assert!(verdict.verified);
        assert!((verdict.distance - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_threshold_override_wins() {
        let mut verifier = FaceVerifier::new("models", Some(0.4));
        let threshold = verifier.threshold(&ModelId::new("ArcFace"), DistanceMetric::Euclidean).unwrap();
        assert_eq!(threshold, 0.4);
    }
}
