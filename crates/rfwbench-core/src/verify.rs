//! The verification boundary.
//!
//! The harness never computes similarity itself. Everything model-specific
//! sits behind [`Verifier`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::VerificationFailure;

/// Face recognition model identifier, e.g. `"ArcFace"`.
///
/// Opaque to the harness; the verifier decides what it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub String);

/// Face detector identifier, e.g. `"scrfd"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectorId(pub String);

macro_rules! opaque_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }
    };
}

opaque_id!(ModelId);
opaque_id!(DetectorId);

/// How two embeddings are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`
    Cosine,
    Euclidean,
    /// Euclidean distance between L2-normalized vectors.
    EuclideanL2,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        })
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(format!(
                "unknown distance metric {other:?} (expected cosine, euclidean or euclidean_l2)"
            )),
        }
    }
}

/// One verification call.
#[derive(Debug, Clone, Copy)]
pub struct VerifyRequest<'a> {
    pub image_a: &'a Path,
    pub image_b: &'a Path,
    pub model: &'a ModelId,
    pub detector: &'a DetectorId,
    /// `None` lets the verifier use its default metric.
    pub distance_metric: Option<DistanceMetric>,
}

/// Result of a successful verification call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    /// The model's same-identity prediction.
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
}

/// Strategy for deciding whether two face images show the same person.
///
/// Implementations may be slow and fail on any pair; the harness treats every
/// failure as a skipped pair.
pub trait Verifier {
    fn verify(&mut self, request: &VerifyRequest<'_>) -> Result<Verdict, VerificationFailure>;
}

impl<V: Verifier + ?Sized> Verifier for &mut V {
    fn verify(&mut self, request: &VerifyRequest<'_>) -> Result<Verdict, VerificationFailure> {
        (**self).verify(request)
    }
}

impl<V: Verifier + ?Sized> Verifier for Box<V> {
    fn verify(&mut self, request: &VerifyRequest<'_>) -> Result<Verdict, VerificationFailure> {
        (**self).verify(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_metric_roundtrip_names() {
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::EuclideanL2,
        ] {
            assert_eq!(metric.to_string().parse::<DistanceMetric>().unwrap(), metric);
        }
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_distance_metric_serde_name() {
        let json = serde_json::to_string(&DistanceMetric::EuclideanL2).unwrap();
        assert_eq!(json, "\"euclidean_l2\"");
    }

    #[test]
    fn test_ids_are_opaque() {
        let model: ModelId = "Facenet512".parse().unwrap();
        assert_eq!(model.as_str(), "Facenet512");
        assert_eq!(DetectorId::new("mtcnn").to_string(), "mtcnn");
    }
}
