use crate::error::{MaskError, Result};
use crate::geometry::{Orientation, ANCHOR_COUNT};
use crate::landmarks::Point;
use image::RgbaImage;
use std::collections::HashMap;

/// A mask texture with its six reference anchors in template pixel space,
/// in the same `[a, b, c, f, e, d]` order as [`crate::MaskGeometry::anchors`].
#[derive(Debug, Clone)]
pub struct MaskTemplate {
    pub name: String,
    pub image: RgbaImage,
    pub anchors: [Point; ANCHOR_COUNT],
}

impl MaskTemplate {
    /// Anchors default to [`default_anchors`] when not supplied.
    pub fn new(
        name: impl Into<String>,
        image: RgbaImage,
        anchors: Option<[Point; ANCHOR_COUNT]>,
    ) -> Self {
        let anchors =
            anchors.unwrap_or_else(|| default_anchors(image.width(), image.height()));
        Self {
            name: name.into(),
            image,
            anchors,
        }
    }
}

/// Anchors for a texture that fills its whole canvas: cheeks a third of the
/// way down the sides, bridge top-center, chin bottom-center.
pub fn default_anchors(width: u32, height: u32) -> [Point; ANCHOR_COUNT] {
    let (w, h) = (width as f32, height as f32);
    [
        Point::new(0.0, 0.3 * h),
        Point::new(0.5 * w, 0.0),
        Point::new(w, 0.3 * h),
        Point::new(0.85 * w, 0.8 * h),
        Point::new(0.5 * w, h),
        Point::new(0.15 * w, 0.8 * h),
    ]
}

/// Read-only set of named templates, loaded once and shared across images.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, MaskTemplate>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: MaskTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Result<&MaskTemplate> {
        self.templates
            .get(name)
            .ok_or_else(|| MaskError::MissingTemplate(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up `name`, preferring its `<name>_left` / `<name>_right`
    /// variant for a turned face when the catalog has one.
    pub fn resolve(&self, name: &str, orientation: Orientation) -> Result<&MaskTemplate> {
        if let Some(suffix) = orientation.suffix() {
            if let Some(t) = self.templates.get(&format!("{}_{}", name, suffix)) {
                log::debug!("using {} variant of template {}", suffix, name);
                return Ok(t);
            }
        }
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> MaskTemplate {
        MaskTemplate::new(name, RgbaImage::new(100, 50), None)
    }

    #[test]
    fn default_anchor_layout() {
        let t = template("plain");
        let [a, b, c, _, e, _] = t.anchors;
        assert!(a.distance(&Point::new(0.0, 15.0)) < 1e-4);
        assert_eq!(b, Point::new(50.0, 0.0));
        assert!(c.distance(&Point::new(100.0, 15.0)) < 1e-4);
        assert_eq!(e, Point::new(50.0, 50.0));
    }

    #[test]
    fn missing_template_is_an_error() {
        let catalog = TemplateCatalog::new();
        assert_eq!(
            catalog.get("check_1").unwrap_err(),
            MaskError::MissingTemplate("check_1".to_string())
        );
    }

    #[test]
    fn orientation_variants_are_preferred() {
        let mut catalog = TemplateCatalog::new();
        catalog.insert(template("surgical_blue"));
        catalog.insert(template("surgical_blue_left"));

        let left = catalog.resolve("surgical_blue", Orientation::Left).unwrap();
        assert_eq!(left.name, "surgical_blue_left");
        let right = catalog.resolve("surgical_blue", Orientation::Right).unwrap();
        assert_eq!(right.name, "surgical_blue");
        assert_eq!(catalog.names(), vec!["surgical_blue", "surgical_blue_left"]);
    }
}
