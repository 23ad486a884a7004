//! Mask footprint and warp anchors derived from 68-point landmarks.
//!
//! Every mask is anchored on six points, always ordered the same way so that
//! template anchors can correspond to them one-to-one:
//!
//! - `a`: left cheek, where the line through the nose tip crosses the jaw
//! - `b`: top of the mask (nose bridge, or brow line for gas masks)
//! - `c`: right cheek, mirror of `a`
//! - `f`: right jaw at lower-lip height
//! - `e`: chin
//! - `d`: left jaw at lower-lip height

use crate::code::MaskType;
use crate::error::{MaskError, Result};
use crate::landmarks::{
    FaceLandmarks, Point, CHIN, LEFT_BROW, LEFT_EYE, LOWER_LIP, NOSE_TIP, NOSE_TOP,
    RIGHT_BROW, RIGHT_EYE,
};
use rand::seq::SliceRandom;
use rand::Rng;

/// Head turn beyond which a side-specific template is preferred, in degrees.
pub const TURN_THRESHOLD_DEG: f32 = 13.0;

pub const ANCHOR_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Frontal,
    /// Nose points towards the image's left edge.
    Left,
    /// Nose points towards the image's right edge.
    Right,
}

impl Orientation {
    pub fn from_angle(angle_deg: f32) -> Self {
        if angle_deg > TURN_THRESHOLD_DEG {
            Orientation::Left
        } else if angle_deg < -TURN_THRESHOLD_DEG {
            Orientation::Right
        } else {
            Orientation::Frontal
        }
    }

    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Orientation::Frontal => None,
            Orientation::Left => Some("left"),
            Orientation::Right => Some("right"),
        }
    }
}

/// Image region a mask covers, plus the anchors the template warp targets.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskGeometry {
    pub mask_type: MaskType,
    /// Margin-expanded footprint, clipped to the image.
    pub polygon: Vec<Point>,
    /// `[a, b, c, f, e, d]`
    pub anchors: [Point; ANCHOR_COUNT],
    /// Signed nose deviation from the eye-line normal, in degrees.
    pub angle: f32,
    pub orientation: Orientation,
}

/// Pick a concrete type for `random`; any other type is returned unchanged.
pub fn resolve_mask_type<R: Rng + ?Sized>(mask_type: MaskType, rng: &mut R) -> MaskType {
    match mask_type {
        MaskType::Random => {
            let chosen = *MaskType::PAINTABLE
                .choose(rng)
                .unwrap_or(&MaskType::Surgical);
            log::debug!("random mask resolved to {}", chosen);
            chosen
        }
        other => other,
    }
}

/// Compute the mask footprint for one face.
///
/// `margin` is the outward expansion as a fraction of the face width.
/// `random` must be resolved with [`resolve_mask_type`] first.
pub fn compute_geometry(
    landmarks: &FaceLandmarks,
    mask_type: MaskType,
    image_size: (u32, u32),
    margin: f32,
) -> Result<MaskGeometry> {
    if landmarks
        .points()
        .iter()
        .any(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        return Err(MaskError::DegenerateGeometry(
            "landmarks contain non-finite coordinates".to_string(),
        ));
    }

    let axis = landmarks[NOSE_TIP] - landmarks[NOSE_TOP];
    if axis.length() < f32::EPSILON {
        return Err(MaskError::DegenerateGeometry(
            "nose bridge has zero length".to_string(),
        ));
    }

    let (anchors, outline) = match mask_type {
        MaskType::Surgical
        | MaskType::N95
        | MaskType::KN95
        | MaskType::Cloth
        | MaskType::Inpaint => lower_face(landmarks, axis),
        MaskType::Gas => full_face(landmarks, axis),
        MaskType::Random => {
            return Err(MaskError::UnsupportedType(
                "random (unresolved)".to_string(),
            ))
        }
    };

    let expanded = expand(&outline, margin * landmarks.face_width());
    let polygon = clip_to_rect(&expanded, image_size.0 as f32, image_size.1 as f32);
    if polygon.len() < 3 {
        return Err(MaskError::DegenerateGeometry(format!(
            "{} footprint lies outside the image",
            mask_type
        )));
    }

    let angle = face_angle(landmarks);
    Ok(MaskGeometry {
        mask_type,
        polygon,
        anchors,
        angle,
        orientation: Orientation::from_angle(angle),
    })
}

fn lower_face(lm: &FaceLandmarks, axis: Point) -> ([Point; ANCHOR_COUNT], Vec<Point>) {
    let jaw = lm.jaw();
    let across = Point::new(-axis.y, axis.x);

    let (a, c) = outermost(line_chain_hits(lm[NOSE_TIP], across, jaw))
        .unwrap_or((jaw[1], jaw[15]));
    let b = lm[NOSE_TOP].midpoint(&lm[NOSE_TOP + 1]);

    let e = line_chain_hits(lm[NOSE_TOP], axis, jaw)
        .into_iter()
        .max_by(|p, q| {
            (*p - lm[NOSE_TOP])
                .dot(&axis)
                .total_cmp(&(*q - lm[NOSE_TOP]).dot(&axis))
        })
        .unwrap_or(lm[CHIN]);

    let (d, f) = outermost(line_chain_hits(lm[LOWER_LIP], c - a, jaw))
        .unwrap_or((jaw[4], jaw[12]));

    // b, c, the jaw below the cheek line from right to left, a
    let cheek_line = c - a;
    let mut outline = vec![b, c];
    outline.extend(
        jaw.iter()
            .rev()
            .filter(|p| cheek_line.cross(&(**p - a)) > 0.0)
            .copied(),
    );
    outline.push(a);

    ([a, b, c, f, e, d], dedup(outline))
}

fn full_face(lm: &FaceLandmarks, axis: Point) -> ([Point; ANCHOR_COUNT], Vec<Point>) {
    let jaw = lm.jaw();
    let up = axis * (-1.0 / axis.length());
    let brow_mid = lm[RIGHT_BROW.end - 1].midpoint(&lm[LEFT_BROW.start]);
    let lift = up * (brow_mid.distance(&lm[NOSE_TIP]) * 0.25);

    let b = brow_mid + lift;
    let anchors = [jaw[0], b, jaw[16], jaw[12], jaw[8], jaw[4]];

    let mut outline: Vec<Point> = jaw.to_vec();
    outline.extend(
        LEFT_BROW
            .rev()
            .chain(RIGHT_BROW.rev())
            .map(|i| lm[i] + lift),
    );
    (anchors, dedup(outline))
}

/// Intersections of the infinite line through `origin` along `dir` with
/// the segments of `chain`, in chain order.
pub fn line_chain_hits(origin: Point, dir: Point, chain: &[Point]) -> Vec<Point> {
    let mut hits: Vec<Point> = Vec::new();
    for seg in chain.windows(2) {
        let (p, q) = (seg[0], seg[1]);
        let edge = q - p;
        let denom = edge.cross(&dir);
        if denom.abs() < f32::EPSILON {
            continue;
        }
        // p + s * edge lies on the line
        let s = (origin - p).cross(&dir) / denom;
        if (0.0..=1.0).contains(&s) {
            let hit = p + edge * s;
            // shared segment endpoints
            if hits.last().map_or(true, |last| last.distance(&hit) > 1e-3) {
                hits.push(hit);
            }
        }
    }
    hits
}

fn outermost(hits: Vec<Point>) -> Option<(Point, Point)> {
    if hits.len() < 2 {
        return None;
    }
    Some((hits[0], hits[hits.len() - 1]))
}

fn face_angle(lm: &FaceLandmarks) -> f32 {
    let centroid = |range: std::ops::Range<usize>| {
        let n = range.len() as f32;
        let sum = range.fold(Point::default(), |acc, i| acc + lm[i]);
        sum * (1.0 / n)
    };
    let eye_line = centroid(LEFT_EYE) - centroid(RIGHT_EYE);
    let normal = Point::new(-eye_line.y, eye_line.x);
    let nose = lm[NOSE_TIP] - lm[NOSE_TOP];
    normal.cross(&nose).atan2(normal.dot(&nose)).to_degrees()
}

fn dedup(mut points: Vec<Point>) -> Vec<Point> {
    points.dedup_by(|p, q| p.distance(q) < 1e-3);
    while points.len() > 1 && points[0].distance(&points[points.len() - 1]) < 1e-3 {
        points.pop();
    }
    points
}

/// Push every vertex away from the centroid by `amount` pixels.
fn expand(points: &[Point], amount: f32) -> Vec<Point> {
    if points.is_empty() || amount == 0.0 {
        return points.to_vec();
    }
    let n = points.len() as f32;
    let centroid = points.iter().fold(Point::default(), |acc, p| acc + *p) * (1.0 / n);
    points
        .iter()
        .map(|p| {
            let out = *p - centroid;
            let len = out.length();
            if len < f32::EPSILON {
                *p
            } else {
                *p + out * (amount / len)
            }
        })
        .collect()
}

/// Sutherland-Hodgman clip against `[0, width] x [0, height]`.
pub fn clip_to_rect(polygon: &[Point], width: f32, height: f32) -> Vec<Point> {
    let inside_fns: [(fn(Point, f32, f32) -> bool, fn(Point, Point, f32, f32) -> Point); 4] = [
        (|p, _, _| p.x >= 0.0, |p, q, _, _| at_x(p, q, 0.0)),
        (|p, w, _| p.x <= w, |p, q, w, _| at_x(p, q, w)),
        (|p, _, _| p.y >= 0.0, |p, q, _, _| at_y(p, q, 0.0)),
        (|p, _, h| p.y <= h, |p, q, _, h| at_y(p, q, h)),
    ];

    let mut output = polygon.to_vec();
    for (inside, cut) in inside_fns {
        let input = std::mem::take(&mut output);
        if input.is_empty() {
            break;
        }
        let mut prev = input[input.len() - 1];
        for &cur in &input {
            let cur_in = inside(cur, width, height);
            let prev_in = inside(prev, width, height);
            if cur_in {
                if !prev_in {
                    output.push(cut(prev, cur, width, height));
                }
                output.push(cur);
            } else if prev_in {
                output.push(cut(prev, cur, width, height));
            }
            prev = cur;
        }
    }
    dedup(output)
}

fn at_x(p: Point, q: Point, x: f32) -> Point {
    let t = (x - p.x) / (q.x - p.x);
    Point::new(x, p.y + t * (q.y - p.y))
}

fn at_y(p: Point, q: Point, y: f32) -> Point {
    let t = (y - p.y) / (q.y - p.y);
    Point::new(p.x + t * (q.x - p.x), y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::BoundingBox;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn face() -> FaceLandmarks {
        FaceLandmarks::from_mean_shape(BoundingBox::new(100.0, 100.0, 200.0, 200.0))
    }

    #[test]
    fn surgical_anchors_follow_the_face() {
        let g = compute_geometry(&face(), MaskType::Surgical, (400, 400), 0.0).unwrap();
        let [a, b, c, f, e, d] = g.anchors;

        // nose tip at y = 210; cheek points sit on that line
        assert!((a.y - 210.0).abs() < 1e-3 && (c.y - 210.0).abs() < 1e-3);
        assert!(a.x < 130.0 && c.x > 270.0);
        assert!((b.x - 200.0).abs() < 1e-3 && (b.y - 172.0).abs() < 1e-3);
        assert!((e.x - 200.0).abs() < 1e-3 && (e.y - 278.0).abs() < 1e-3);
        assert!(d.x < f.x && (d.y - f.y).abs() < 1e-3);
        assert_eq!(g.orientation, Orientation::Frontal);
    }

    #[test]
    fn gas_reaches_above_the_brows() {
        let lm = face();
        let surgical = compute_geometry(&lm, MaskType::Surgical, (400, 400), 0.0).unwrap();
        let gas = compute_geometry(&lm, MaskType::Gas, (400, 400), 0.0).unwrap();
        let top = |g: &MaskGeometry| g.polygon.iter().map(|p| p.y).fold(f32::MAX, f32::min);
        assert!(top(&gas) < lm[19].y);
        assert!(top(&gas) < top(&surgical));
    }

    #[test]
    fn inpaint_shares_the_surgical_footprint() {
        let lm = face();
        let s = compute_geometry(&lm, MaskType::Surgical, (400, 400), 0.04).unwrap();
        let i = compute_geometry(&lm, MaskType::Inpaint, (400, 400), 0.04).unwrap();
        assert_eq!(s.polygon, i.polygon);
        assert_eq!(s.anchors, i.anchors);
    }

    #[test]
    fn margin_expands_outwards() {
        let lm = face();
        let tight = compute_geometry(&lm, MaskType::Cloth, (400, 400), 0.0).unwrap();
        let loose = compute_geometry(&lm, MaskType::Cloth, (400, 400), 0.05).unwrap();
        let bottom = |g: &MaskGeometry| g.polygon.iter().map(|p| p.y).fold(f32::MIN, f32::max);
        assert!(bottom(&loose) > bottom(&tight) + 5.0);
    }

    #[test]
    fn polygon_is_clipped_to_the_image() {
        let lm = FaceLandmarks::from_mean_shape(BoundingBox::new(-60.0, 40.0, 200.0, 200.0));
        let g = compute_geometry(&lm, MaskType::Surgical, (120, 200), 0.04).unwrap();
        assert!(g
            .polygon
            .iter()
            .all(|p| (0.0..=120.0).contains(&p.x) && (0.0..=200.0).contains(&p.y)));
    }

    #[test]
    fn face_outside_the_image_is_degenerate() {
        let lm = FaceLandmarks::from_mean_shape(BoundingBox::new(500.0, 500.0, 100.0, 100.0));
        assert!(matches!(
            compute_geometry(&lm, MaskType::Surgical, (100, 100), 0.0),
            Err(MaskError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn non_finite_landmarks_are_rejected() {
        let mut points = face().points().to_vec();
        points[CHIN].y = f32::NAN;
        let broken = FaceLandmarks::new(points).unwrap();
        assert!(matches!(
            compute_geometry(&broken, MaskType::Surgical, (400, 400), 0.04),
            Err(MaskError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn turned_face_is_detected() {
        let mut points = face().points().to_vec();
        points[NOSE_TIP].x += 40.0;
        let turned = FaceLandmarks::new(points).unwrap();
        let g = compute_geometry(&turned, MaskType::Surgical, (400, 400), 0.0).unwrap();
        assert_eq!(g.orientation, Orientation::Right);
        assert!(g.angle < -TURN_THRESHOLD_DEG);
    }

    #[test]
    fn random_must_be_resolved() {
        assert!(matches!(
            compute_geometry(&face(), MaskType::Random, (400, 400), 0.0),
            Err(MaskError::UnsupportedType(_))
        ));

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let t = resolve_mask_type(MaskType::Random, &mut rng);
            assert!(MaskType::PAINTABLE.contains(&t));
        }
        assert_eq!(resolve_mask_type(MaskType::Gas, &mut rng), MaskType::Gas);
    }

    #[test]
    fn clip_square() {
        let square = [
            Point::new(-5.0, -5.0),
            Point::new(5.0, -5.0),
            Point::new(5.0, 5.0),
            Point::new(-5.0, 5.0),
        ];
        let clipped = clip_to_rect(&square, 10.0, 10.0);
        assert_eq!(clipped.len(), 4);
        assert!(clipped.contains(&Point::new(0.0, 0.0)));
        assert!(clipped.contains(&Point::new(5.0, 5.0)));
    }
}
