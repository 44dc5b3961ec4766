use rfwbench_core::DistanceMetric;

/// Detected face in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union with another box, 0 when both are empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face embedding as the recognizer emits it (512-dimensional for ArcFace).
///
/// Not normalized: `Euclidean` thresholds are calibrated on raw magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]; 0 if either vector is all zeros.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
        for (a, b) in self.values.iter().zip(&other.values) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        euclidean(&self.values, &other.values)
    }

    /// Unit-length copy of the vector; zero vectors are returned unchanged.
    pub fn l2_normalized(&self) -> Vec<f32> {
        l2_normalize(&self.values)
    }

    /// Distance under `metric`. Smaller means more alike.
    pub fn distance(&self, other: &Embedding, metric: DistanceMetric) -> f32 {
        match metric {
            DistanceMetric::Cosine => 1.0 - self.cosine_similarity(other),
            DistanceMetric::Euclidean => self.euclidean_distance(other),
            DistanceMetric::EuclideanL2 => euclidean(&self.l2_normalized(), &other.l2_normalized()),
        }
    }
}

fn l2_normalize(values: &[f32]) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|v| v / norm).collect()
    } else {
        values.to_vec()
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn emb(values: &[f32]) -> Embedding {
        Embedding {
            values: values.to_vec(),
        }
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
            landmarks: None,
        }
    }

    #[test]
    fn test_cosine_distance() {
        let a = emb(&[1.0, 0.0]);
        assert_abs_diff_eq!(a.distance(&emb(&[2.0, 0.0]), DistanceMetric::Cosine), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.distance(&emb(&[0.0, 3.0]), DistanceMetric::Cosine), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.distance(&emb(&[-1.0, 0.0]), DistanceMetric::Cosine), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_vector_similarity() {
        assert_eq!(emb(&[0.0, 0.0]).cosine_similarity(&emb(&[1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_euclidean_variants() {
        let a = emb(&[3.0, 0.0]);
        let b = emb(&[0.0, 4.0]);
        assert_abs_diff_eq!(a.distance(&b, DistanceMetric::Euclidean), 5.0, epsilon = 1e-6);
        // Normalized: (1,0) vs (0,1)
        assert_abs_diff_eq!(
            a.distance(&b, DistanceMetric::EuclideanL2),
            std::f32::consts::SQRT_2,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        assert_abs_diff_eq!(a.iou(&a), 1.0, epsilon = 1e-6);
        assert_eq!(a.iou(&bbox(20.0, 20.0, 5.0, 5.0)), 0.0);
        // 5x10 overlap over 150 union
        assert_abs_diff_eq!(a.iou(&bbox(5.0, 0.0, 10.0, 10.0)), 50.0 / 150.0, epsilon = 1e-6);
        assert_eq!(bbox(0.0, 0.0, 0.0, 0.0).iou(&bbox(0.0, 0.0, 0.0, 0.0)), 0.0);
    }
}
