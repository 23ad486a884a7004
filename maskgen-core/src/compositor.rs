use crate::code::{parse_hex_color, MaskSpecification, MaskType};
use crate::error::{MaskError, Result};
use crate::geometry::MaskGeometry;
use crate::homography::Homography;
use crate::inpaint;
use crate::landmarks::Point;
use crate::raster::{self, ON};
use crate::template::{MaskTemplate, TemplateCatalog};
use image::{GrayImage, Rgb, RgbImage, RgbaImage};

pub const DEFAULT_INPAINT_RADIUS: u32 = 3;

/// One masked rendering of one face.
#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub masked_image: RgbImage,
    /// [`raster::ON`] where the mask was rendered, [`raster::OFF`] elsewhere.
    pub occupancy_mask: GrayImage,
    pub mask_label: String,
    pub mask_type: MaskType,
    pub face_index: usize,
}

/// Opacity of the texture and flat-color layers, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub pattern: f32,
    pub color: f32,
}

impl BlendWeights {
    pub fn new(pattern: f32, color: f32) -> Result<Self> {
        check_weight("pattern_weight", pattern)?;
        check_weight("color_weight", color)?;
        Ok(Self { pattern, color })
    }
}

fn check_weight(name: &'static str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MaskError::InvalidWeight { name, value })
    }
}

/// Renders mask specifications onto face geometry.
#[derive(Debug, Clone, Copy)]
pub struct Compositor<'a> {
    catalog: &'a TemplateCatalog,
    weights: BlendWeights,
    match_lighting: bool,
    inpaint_radius: u32,
}

impl<'a> Compositor<'a> {
    pub fn new(catalog: &'a TemplateCatalog, weights: BlendWeights) -> Self {
        Self {
            catalog,
            weights,
            match_lighting: false,
            inpaint_radius: DEFAULT_INPAINT_RADIUS,
        }
    }

    /// Scale texture brightness towards the face's brightness.
    pub fn with_lighting_match(mut self, enabled: bool) -> Self {
        self.match_lighting = enabled;
        self
    }

    pub fn with_inpaint_radius(mut self, radius: u32) -> Self {
        self.inpaint_radius = radius;
        self
    }

    /// Render `spec` into a copy of `source` over `geometry`.
    ///
    /// The render path follows `geometry.mask_type`, which is the resolved
    /// type when `spec` asked for `random`.
    pub fn composite(
        &self,
        source: &RgbImage,
        geometry: &MaskGeometry,
        spec: &MaskSpecification,
    ) -> Result<CompositeResult> {
        let (width, height) = source.dimensions();
        let occupancy = raster::rasterize(&geometry.polygon, width, height);
        let mut out = source.clone();

        match geometry.mask_type {
            MaskType::Random => {
                return Err(MaskError::UnsupportedType(
                    "random (unresolved)".to_string(),
                ))
            }
            MaskType::Inpaint => inpaint::fill(&mut out, &occupancy, self.inpaint_radius),
            _ => self.paint(&mut out, &occupancy, geometry, spec)?,
        }

        Ok(CompositeResult {
            masked_image: out,
            occupancy_mask: occupancy,
            mask_label: spec.with_type(geometry.mask_type).label(),
            mask_type: geometry.mask_type,
            face_index: 0,
        })
    }

    fn paint(
        &self,
        out: &mut RgbImage,
        occupancy: &GrayImage,
        geometry: &MaskGeometry,
        spec: &MaskSpecification,
    ) -> Result<()> {
        let color = spec.color.as_deref().map(parse_hex_color).transpose()?;
        let texture = match spec.texture.as_deref() {
            Some(name) => {
                let template = self.catalog.resolve(name, geometry.orientation)?;
                Some(WarpedTexture::new(template, geometry)?)
            }
            None => None,
        };

        let gain = match &texture {
            Some(t) if self.match_lighting => {
                let face = mean_brightness(
                    out.enumerate_pixels()
                        .filter(|(x, y, _)| occupancy.get_pixel(*x, *y)[0] == ON)
                        .map(|(_, _, p)| p.0),
                );
                let tex = mean_brightness(
                    t.template
                        .image
                        .pixels()
                        .filter(|p| p[3] > 0)
                        .map(|p| [p[0], p[1], p[2]]),
                );
                match (face, tex) {
                    (Some(f), Some(m)) => 1.0 + (f - m) / 255.0,
                    _ => 1.0,
                }
            }
            _ => 1.0,
        };

        for (x, y, mask) in occupancy.enumerate_pixels() {
            if mask[0] != ON {
                continue;
            }
            let src = out.get_pixel(x, y);
            let mut px = [src[0] as f32, src[1] as f32, src[2] as f32];

            if let Some(sample) = texture.as_ref().and_then(|t| t.sample(x, y)) {
                let w = self.weights.pattern * sample[3] / 255.0;
                for c in 0..3 {
                    px[c] = lerp(px[c], (sample[c] * gain).min(255.0), w);
                }
            }
            if let Some(flat) = color {
                for c in 0..3 {
                    px[c] = lerp(px[c], flat[c] as f32, self.weights.color);
                }
            }

            out.put_pixel(x, y, Rgb(px.map(|v| v.round().clamp(0.0, 255.0) as u8)));
        }
        Ok(())
    }
}

/// Single-shot form of [`Compositor::composite`] with default settings.
pub fn composite(
    source: &RgbImage,
    geometry: &MaskGeometry,
    spec: &MaskSpecification,
    catalog: &TemplateCatalog,
    pattern_weight: f32,
    color_weight: f32,
) -> Result<CompositeResult> {
    let weights = BlendWeights::new(pattern_weight, color_weight)?;
    Compositor::new(catalog, weights).composite(source, geometry, spec)
}

fn lerp(a: f32, b: f32, w: f32) -> f32 {
    (1.0 - w) * a + w * b
}

/// Mean HSV value (max channel) of the given pixels.
fn mean_brightness(pixels: impl Iterator<Item = [u8; 3]>) -> Option<f32> {
    let (sum, n) = pixels.fold((0u64, 0u64), |(sum, n), p| {
        (sum + p[0].max(p[1]).max(p[2]) as u64, n + 1)
    });
    (n > 0).then(|| sum as f32 / n as f32)
}

/// A template mapped into image space through the inverse of the
/// template-to-face homography.
struct WarpedTexture<'t> {
    template: &'t MaskTemplate,
    image_to_template: Homography,
}

impl<'t> WarpedTexture<'t> {
    fn new(template: &'t MaskTemplate, geometry: &MaskGeometry) -> Result<Self> {
        let forward = Homography::estimate(&template.anchors, &geometry.anchors)?;
        Ok(Self {
            template,
            image_to_template: forward.inverse()?,
        })
    }

    /// Bilinear RGBA sample for image pixel `(x, y)`; `None` off-template.
    fn sample(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        let at = self.image_to_template.apply(Point::new(x as f32, y as f32))?;
        bilinear(&self.template.image, at.x, at.y)
    }
}

fn bilinear(img: &RgbaImage, in_x: f32, in_y: f32) -> Option<[f32; 4]> {
    let (img_w, img_h) = img.dimensions();
    if !(in_x >= 0.0 && in_x < img_w as f32 && in_y >= 0.0 && in_y < img_h as f32) {
        return None;
    }

    let x0 = in_x.floor() as u32;
    let y0 = in_y.floor() as u32;
    let x1 = (x0 + 1).min(img_w - 1);
    let y1 = (y0 + 1).min(img_h - 1);

    let fx = in_x - x0 as f32;
    let fy = in_y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = [0.0f32; 4];
    for (c, v) in out.iter_mut().enumerate() {
        *v = p00[c] as f32 * w00
            + p10[c] as f32 * w10
            + p01[c] as f32 * w01
            + p11[c] as f32 * w11;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::MaskSpecification;
    use crate::geometry::compute_geometry;
    use crate::landmarks::{BoundingBox, FaceLandmarks};
    use crate::raster::OFF;
    use image::Rgba;

    fn scene() -> (RgbImage, MaskGeometry) {
        let img = RgbImage::from_fn(240, 240, |x, y| Rgb([x as u8, y as u8, 90]));
        let face = FaceLandmarks::from_mean_shape(BoundingBox::new(20.0, 20.0, 200.0, 200.0));
        let geometry = compute_geometry(&face, MaskType::Surgical, (240, 240), 0.04).unwrap();
        (img, geometry)
    }

    fn colored(color: &str) -> MaskSpecification {
        MaskSpecification {
            color: Some(color.to_string()),
            ..MaskSpecification::bare(MaskType::Surgical)
        }
    }

    #[test]
    fn zero_weights_leave_pixels_alone() {
        let (img, geometry) = scene();
        let catalog = TemplateCatalog::new();
        let result = composite(&img, &geometry, &colored("#ff0000"), &catalog, 0.0, 0.0).unwrap();
        assert_eq!(result.masked_image, img);
        assert!(raster::area(&result.occupancy_mask) > 0);
    }

    #[test]
    fn full_color_weight_paints_the_footprint() {
        let (img, geometry) = scene();
        let catalog = TemplateCatalog::new();
        let result = composite(&img, &geometry, &colored("#ff0000"), &catalog, 0.0, 1.0).unwrap();
        for (x, y, m) in result.occupancy_mask.enumerate_pixels() {
            let px = result.masked_image.get_pixel(x, y);
            if m[0] == ON {
                assert_eq!(*px, Rgb([255, 0, 0]));
            } else {
                assert_eq!(m[0], OFF);
                assert_eq!(px, img.get_pixel(x, y));
            }
        }
        assert_eq!(result.mask_label, "surgical_ff0000");
    }

    #[test]
    fn opaque_texture_at_full_weight_replaces_pixels() {
        let (img, geometry) = scene();
        let mut catalog = TemplateCatalog::new();
        catalog.insert(MaskTemplate::new(
            "green",
            RgbaImage::from_pixel(64, 48, Rgba([0, 200, 0, 255])),
            None,
        ));
        let spec = MaskSpecification {
            texture: Some("green".to_string()),
            ..MaskSpecification::bare(MaskType::Cloth)
        };
        let geometry = MaskGeometry {
            mask_type: MaskType::Cloth,
            ..geometry
        };
        let result = composite(&img, &geometry, &spec, &catalog, 1.0, 0.0).unwrap();

        // the anchors' centroid is well inside both the polygon and the warped template
        let cx = geometry.anchors.iter().map(|p| p.x).sum::<f32>() / 6.0;
        let cy = geometry.anchors.iter().map(|p| p.y).sum::<f32>() / 6.0;
        assert_eq!(*result.masked_image.get_pixel(cx as u32, cy as u32), Rgb([0, 200, 0]));
        assert_eq!(result.mask_label, "cloth_green");
    }

    #[test]
    fn zero_pattern_weight_hides_an_opaque_texture() {
        let (img, geometry) = scene();
        let mut catalog = TemplateCatalog::new();
        catalog.insert(MaskTemplate::new(
            "green",
            RgbaImage::from_pixel(64, 48, Rgba([0, 200, 0, 255])),
            None,
        ));
        let spec = MaskSpecification {
            color: Some("#ff0000".to_string()),
            texture: Some("green".to_string()),
            ..MaskSpecification::bare(MaskType::Cloth)
        };
        let geometry = MaskGeometry {
            mask_type: MaskType::Cloth,
            ..geometry
        };
        let result = composite(&img, &geometry, &spec, &catalog, 0.0, 0.0).unwrap();
        assert_eq!(result.masked_image, img);
        assert!(raster::area(&result.occupancy_mask) > 0);

        // the same texture at full weight is visible
        let shown = composite(&img, &geometry, &spec, &catalog, 1.0, 0.0).unwrap();
        assert_ne!(shown.masked_image, img);
    }

    #[test]
    fn transparent_texture_is_invisible() {
        let (img, geometry) = scene();
        let mut catalog = TemplateCatalog::new();
        catalog.insert(MaskTemplate::new(
            "clear",
            RgbaImage::from_pixel(64, 48, Rgba([0, 0, 0, 0])),
            None,
        ));
        let spec = MaskSpecification {
            texture: Some("clear".to_string()),
            ..MaskSpecification::bare(MaskType::Surgical)
        };
        let result = composite(&img, &geometry, &spec, &catalog, 1.0, 0.0).unwrap();
        assert_eq!(result.masked_image, img);
    }

    #[test]
    fn missing_texture_fails() {
        let (img, geometry) = scene();
        let spec = MaskSpecification {
            texture: Some("nope".to_string()),
            ..MaskSpecification::bare(MaskType::Surgical)
        };
        let catalog = TemplateCatalog::new();
        let err = composite(&img, &geometry, &spec, &catalog, 0.5, 0.5).unwrap_err();
        assert_eq!(err, MaskError::MissingTemplate("nope".to_string()));
    }

    #[test]
    fn weights_are_validated() {
        let (img, geometry) = scene();
        let catalog = TemplateCatalog::new();
        let spec = colored("#ff0000");
        assert!(matches!(
            composite(&img, &geometry, &spec, &catalog, 1.5, 0.0),
            Err(MaskError::InvalidWeight { name: "pattern_weight", .. })
        ));
        assert!(matches!(
            composite(&img, &geometry, &spec, &catalog, 0.0, -0.1),
            Err(MaskError::InvalidWeight { name: "color_weight", .. })
        ));
    }

    #[test]
    fn inpaint_changes_only_the_footprint() {
        let (img, surgical) = scene();
        let geometry = MaskGeometry {
            mask_type: MaskType::Inpaint,
            ..surgical.clone()
        };
        let catalog = TemplateCatalog::new();
        let painted = composite(&img, &surgical, &colored("#ff0000"), &catalog, 0.0, 1.0).unwrap();
        let spec = MaskSpecification::bare(MaskType::Inpaint);
        let filled = composite(&img, &geometry, &spec, &catalog, 0.5, 0.5).unwrap();

        assert_eq!(painted.occupancy_mask, filled.occupancy_mask);
        for (x, y, m) in filled.occupancy_mask.enumerate_pixels() {
            if m[0] != ON {
                assert_eq!(filled.masked_image.get_pixel(x, y), img.get_pixel(x, y));
            }
        }
        assert_ne!(filled.masked_image, img);
        assert_eq!(filled.mask_label, "inpaint");
    }

    #[test]
    fn lighting_match_brightens_dark_textures_on_bright_faces() {
        let img = RgbImage::from_pixel(240, 240, Rgb([230, 230, 230]));
        let face = FaceLandmarks::from_mean_shape(BoundingBox::new(20.0, 20.0, 200.0, 200.0));
        let geometry = compute_geometry(&face, MaskType::Surgical, (240, 240), 0.0).unwrap();
        let mut catalog = TemplateCatalog::new();
        catalog.insert(MaskTemplate::new(
            "dark",
            RgbaImage::from_pixel(64, 48, Rgba([100, 100, 100, 255])),
            None,
        ));
        let spec = MaskSpecification {
            texture: Some("dark".to_string()),
            ..MaskSpecification::bare(MaskType::Surgical)
        };
        let weights = BlendWeights::new(1.0, 0.0).unwrap();
        let plain = Compositor::new(&catalog, weights)
            .composite(&img, &geometry, &spec)
            .unwrap();
        let matched = Compositor::new(&catalog, weights)
            .with_lighting_match(true)
            .composite(&img, &geometry, &spec)
            .unwrap();

        let (x, y) = (geometry.anchors[4].x as u32, geometry.anchors[4].y as u32 - 20);
        assert!(matched.masked_image.get_pixel(x, y)[0] > plain.masked_image.get_pixel(x, y)[0]);
    }
}
