//! Five-point face alignment onto the ArcFace 112x112 template.

use image::{Rgb, RgbImage};

/// Template landmark positions in the 112x112 crop:
/// left eye, right eye, nose, left mouth corner, right mouth corner.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const ALIGNED_SIZE: u32 = 112;

/// 4-DOF similarity transform:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` onto `dst`. `None` when every source
    /// point coincides.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let mean = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = mean(src);
        let (dmx, dmy) = mean(dst);

        let (mut spread, mut cos_term, mut sin_term) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (x, y) = (sx - smx, sy - smy);
            let (u, v) = (dx - dmx, dy - dmy);
            spread += x * x + y * y;
            cos_term += x * u + y * v;
            sin_term += x * v - y * u;
        }
        if spread < 1e-12 {
            return None;
        }

        let a = cos_term / spread;
        let b = sin_term / spread;
        Some(Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Warp the face described by `landmarks` into a 112x112 crop. Pixels that
/// fall outside the photo are black. `None` for degenerate landmarks.
pub fn align_face(photo: &RgbImage, landmarks: &[(f32, f32); 5]) -> Option<RgbImage> {
    let to_template = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112)?;
    let to_photo = to_template.inverse()?;

    Some(RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = to_photo.apply((ox as f32, oy as f32));
        sample_bilinear(photo, sx, sy)
    }))
}

fn sample_bilinear(photo: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (photo.width(), photo.height());
    if w == 0 || h == 0 || x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let tl = photo.get_pixel(x0, y0);
    let tr = photo.get_pixel(x1, y0);
    let bl = photo.get_pixel(x0, y1);
    let br = photo.get_pixel(x1, y1);

    Rgb(std::array::from_fn(|c| {
        let top = tl[c] as f32 * (1.0 - fx) + tr[c] as f32 * fx;
        let bottom = bl[c] as f32 * (1.0 - fx) + br[c] as f32 * fx;
        (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
    }))
}
