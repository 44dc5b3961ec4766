//! ArcFace face recognizer via ONNX Runtime.
//!
//! Turns an aligned 112x112 RGB crop into an embedding.

use crate::alignment;
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
// Symmetric normalization, unlike SCRFD's 128.0.
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("recognizer inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks to align on")]
    NoLandmarks,
    #[error("face landmarks are degenerate")]
    DegenerateLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Raw embedding of `face` in `photo`. The face must carry SCRFD landmarks.
    pub fn extract(&mut self, photo: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(photo, landmarks).ok_or(RecognizerError::DegenerateLandmarks)?;
        let input = preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding { values: raw.to_vec() })
    }
}

fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        if x >= size || y >= size {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;

    #[test]
    fn test_preprocess_keeps_channels_apart() {
        let crop = RgbImage::from_pixel(112, 112, Rgb([0, 128, 255]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE]);
        assert_abs_diff_eq!(tensor[[0, 0, 5, 5]], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(tensor[[0, 1, 5, 5]], 0.5 / 127.5, epsilon = 1e-6);
        assert_abs_diff_eq!(tensor[[0, 2, 5, 5]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_load_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w600k_r50.onnx");
        match FaceRecognizer::load(&path) {
            Err(RecognizerError::ModelNotFound(p)) => assert_eq!(p, path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loaded a model that does not exist"),
        }
    }
}
