//! rfwbench-engine: face verification for still photos.
//!
//! SCRFD finds the face and its five landmarks, the crop is aligned to the
//! ArcFace template, and ArcFace embeddings are compared by distance. Both
//! models run through ONNX Runtime on the CPU. [`FaceVerifier`] exposes the
//! pipeline as an [`rfwbench_core::Verifier`].

pub mod alignment;
pub mod catalog;
pub mod detector;
pub mod recognizer;
pub mod types;
pub mod verifier;

pub use catalog::{ModelCatalog, Thresholds};
pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding};
pub use verifier::{EngineError, FaceVerifier};
