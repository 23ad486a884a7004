//! 68-point facial landmarks (iBUG / dlib ordering) and the provider seam
//! through which an external face-analysis model hands them to the core.

use crate::error::{MaskError, Result};
use image::RgbImage;
use std::ops::Range;

pub const LANDMARK_COUNT: usize = 68;

pub const JAW: Range<usize> = 0..17;
pub const RIGHT_BROW: Range<usize> = 17..22;
pub const LEFT_BROW: Range<usize> = 22..27;
pub const NOSE_BRIDGE: Range<usize> = 27..31;
pub const NOSE_BOTTOM: Range<usize> = 31..36;
pub const RIGHT_EYE: Range<usize> = 36..42;
pub const LEFT_EYE: Range<usize> = 42..48;
pub const OUTER_LIP: Range<usize> = 48..60;
pub const INNER_LIP: Range<usize> = 60..68;

pub const CHIN: usize = 8;
pub const NOSE_TOP: usize = 27;
pub const NOSE_TIP: usize = 30;
pub const LOWER_LIP: usize = 57;

/// A 2D point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// 2D cross product (z component).
    pub fn cross(&self, other: &Point) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn dot(&self, other: &Point) -> f32 {
        self.x * other.x + self.y * other.y
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Point {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned face box: top-left corner, width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn denormalize(&self, p: (f32, f32)) -> Point {
        Point::new(self.x + p.0 * self.width, self.y + p.1 * self.height)
    }
}

/// Exactly 68 landmark points for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    points: [Point; LANDMARK_COUNT],
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        let count = points.len();
        let points: [Point; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| MaskError::InvalidLandmarks { count })?;
        Ok(Self { points })
    }

    /// Place the average 68-point face shape inside `bbox`.
    pub fn from_mean_shape(bbox: BoundingBox) -> Self {
        let mut points = [Point::default(); LANDMARK_COUNT];
        for (dst, &src) in points.iter_mut().zip(MEAN_SHAPE.iter()) {
            *dst = bbox.denormalize(src);
        }
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn jaw(&self) -> &[Point] {
        &self.points[JAW]
    }

    /// Distance between the outermost jaw points.
    pub fn face_width(&self) -> f32 {
        self.points[JAW.start].distance(&self.points[JAW.end - 1])
    }
}

impl std::ops::Index<usize> for FaceLandmarks {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

/// Capability that locates faces in an image and returns their landmarks.
///
/// An image without faces yields an empty list.
pub trait LandmarkProvider {
    fn detect_landmarks(&self, image: &RgbImage) -> Result<Vec<FaceLandmarks>>;
}

impl<F> LandmarkProvider for F
where
    F: Fn(&RgbImage) -> Result<Vec<FaceLandmarks>>,
{
    fn detect_landmarks(&self, image: &RgbImage) -> Result<Vec<FaceLandmarks>> {
        self(image)
    }
}

/// Provider that always reports the same faces, regardless of the image.
#[derive(Debug, Clone, Default)]
pub struct StaticLandmarks(pub Vec<FaceLandmarks>);

impl LandmarkProvider for StaticLandmarks {
    fn detect_landmarks(&self, _image: &RgbImage) -> Result<Vec<FaceLandmarks>> {
        Ok(self.0.clone())
    }
}

// Approximate iBUG positions, normalized to the face box.
const MEAN_SHAPE: [(f32, f32); LANDMARK_COUNT] = [
    // Jaw line (0-16)
    (0.10, 0.35),
    (0.11, 0.45),
    (0.12, 0.55),
    (0.14, 0.65),
    (0.18, 0.73),
    (0.24, 0.80),
    (0.32, 0.85),
    (0.41, 0.88),
    (0.50, 0.89),
    (0.59, 0.88),
    (0.68, 0.85),
    (0.76, 0.80),
    (0.82, 0.73),
    (0.86, 0.65),
    (0.88, 0.55),
    (0.89, 0.45),
    (0.90, 0.35),
    // Right eyebrow (17-21)
    (0.20, 0.26),
    (0.25, 0.22),
    (0.32, 0.21),
    (0.38, 0.23),
    (0.43, 0.27),
    // Left eyebrow (22-26)
    (0.57, 0.27),
    (0.62, 0.23),
    (0.68, 0.21),
    (0.75, 0.22),
    (0.80, 0.26),
    // Nose bridge (27-30)
    (0.50, 0.32),
    (0.50, 0.40),
    (0.50, 0.48),
    (0.50, 0.55),
    // Nose bottom (31-35)
    (0.40, 0.58),
    (0.45, 0.60),
    (0.50, 0.62),
    (0.55, 0.60),
    (0.60, 0.58),
    // Right eye (36-41)
    (0.24, 0.32),
    (0.28, 0.29),
    (0.34, 0.29),
    (0.38, 0.33),
    (0.34, 0.35),
    (0.28, 0.35),
    // Left eye (42-47)
    (0.62, 0.33),
    (0.66, 0.29),
    (0.72, 0.29),
    (0.76, 0.32),
    (0.72, 0.35),
    (0.66, 0.35),
    // Outer lip (48-59)
    (0.32, 0.72),
    (0.38, 0.68),
    (0.44, 0.66),
    (0.50, 0.67),
    (0.56, 0.66),
    (0.62, 0.68),
    (0.68, 0.72),
    (0.62, 0.78),
    (0.56, 0.80),
    (0.50, 0.81),
    (0.44, 0.80),
    (0.38, 0.78),
    // Inner lip (60-67)
    (0.36, 0.72),
    (0.44, 0.70),
    (0.50, 0.70),
    (0.56, 0.70),
    (0.64, 0.72),
    (0.56, 0.74),
    (0.50, 0.75),
    (0.44, 0.74),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_landmark_sets() {
        let err = FaceLandmarks::new(vec![Point::new(0.0, 0.0); 5]).unwrap_err();
        assert_eq!(err, MaskError::InvalidLandmarks { count: 5 });
        assert!(FaceLandmarks::new(vec![Point::default(); 68]).is_ok());
    }

    #[test]
    fn mean_shape_fills_the_box() {
        let face = FaceLandmarks::from_mean_shape(BoundingBox::new(100.0, 50.0, 200.0, 200.0));
        assert_eq!(face.points().len(), LANDMARK_COUNT);

        let chin = face[CHIN];
        assert!((chin.x - 200.0).abs() < 1e-4);
        assert!((chin.y - 228.0).abs() < 1e-4);
        assert!((face.face_width() - 160.0).abs() < 1e-3);
        assert_eq!(face.jaw().len(), 17);
    }

    #[test]
    fn closure_provider() {
        let provider = |_: &RgbImage| -> Result<Vec<FaceLandmarks>> { Ok(vec![]) };
        let img = RgbImage::new(4, 4);
        assert!(provider.detect_landmarks(&img).unwrap().is_empty());
    }
}
