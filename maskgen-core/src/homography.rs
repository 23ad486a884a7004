//! Least-squares perspective transform between point sets.
//!
//! Normalized DLT: both point sets are shifted to their centroid and scaled
//! to a mean distance of sqrt(2), the 9 homography entries are taken from
//! the eigenvector of `AᵀA` with the smallest eigenvalue, then the
//! normalization is undone.

use crate::error::{MaskError, Result};
use crate::landmarks::Point;
use nalgebra::{DMatrix, DVector, Matrix3, SymmetricEigen, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    /// Fit the transform mapping `src[i]` onto `dst[i]`; needs 4+ pairs.
    pub fn estimate(src: &[Point], dst: &[Point]) -> Result<Self> {
        if src.len() != dst.len() || src.len() < 4 {
            return Err(MaskError::DegenerateGeometry(format!(
                "homography needs 4+ matching points, got {} and {}",
                src.len(),
                dst.len()
            )));
        }

        let t_src = normalizer(src)?;
        let t_dst = normalizer(dst)?;

        let mut ata = DMatrix::<f64>::zeros(9, 9);
        for (s, d) in src.iter().zip(dst) {
            let s = t_src * Vector3::new(s.x as f64, s.y as f64, 1.0);
            let d = t_dst * Vector3::new(d.x as f64, d.y as f64, 1.0);
            let (x, y) = (s.x, s.y);
            let (u, v) = (d.x, d.y);
            let r1 = DVector::from_vec(vec![-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
            let r2 = DVector::from_vec(vec![0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
            ata += &r1 * r1.transpose();
            ata += &r2 * r2.transpose();
        }

        let eigen = SymmetricEigen::new(ata);
        let smallest = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let h = eigen.eigenvectors.column(smallest);
        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or_else(|| MaskError::DegenerateGeometry("singular normalization".into()))?;
        let mut m = t_dst_inv * hn * t_src;
        let scale = m[(2, 2)];
        if scale.abs() < 1e-12 {
            return Err(MaskError::DegenerateGeometry(
                "homography maps the origin to infinity".into(),
            ));
        }
        m /= scale;
        Ok(Self { m })
    }

    pub fn inverse(&self) -> Result<Self> {
        self.m
            .try_inverse()
            .map(|m| Self { m })
            .ok_or_else(|| MaskError::DegenerateGeometry("homography is singular".into()))
    }

    /// Map a point; `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let v = self.m * Vector3::new(p.x as f64, p.y as f64, 1.0);
        if v.z.abs() < 1e-12 {
            return None;
        }
        Some(Point::new((v.x / v.z) as f32, (v.y / v.z) as f32))
    }
}

fn normalizer(points: &[Point]) -> Result<Matrix3<f64>> {
    let n = points.len() as f64;
    let (cx, cy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (cx, cy) = (cx / n, cy / n);
    let mean_dist = points
        .iter()
        .map(|p| ((p.x as f64 - cx).powi(2) + (p.y as f64 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-9 {
        return Err(MaskError::DegenerateGeometry(
            "all correspondence points coincide".into(),
        ));
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}
