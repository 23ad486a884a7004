use anyhow::{Context, Result};
use maskgen_core::{MaskTemplate, Point, TemplateCatalog};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `templates.toml`: one `[[template]]` table per mask texture.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "template")]
    pub templates: Vec<TemplateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub name: String,
    /// Relative to the manifest's directory.
    pub path: String,
    /// `[a, b, c, f, e, d]` in template pixels.
    #[serde(default)]
    pub anchors: Option<[[f32; 2]; 6]>,
}

/// Load every template listed in `manifest` and decode it to RGBA.
///
/// A missing manifest yields an empty catalog.
pub fn load_catalog(manifest: &Path) -> Result<TemplateCatalog> {
    let mut catalog = TemplateCatalog::new();
    if !manifest.exists() {
        log::debug!("no template manifest at {}", manifest.display());
        return Ok(catalog);
    }

    let raw = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading {}", manifest.display()))?;
    let parsed: Manifest =
        toml::from_str(&raw).with_context(|| format!("parsing {}", manifest.display()))?;
    let base = manifest.parent().unwrap_or(Path::new("."));

    for entry in parsed.templates {
        let file = base.join(&entry.path);
        let image = image::open(&file)
            .with_context(|| format!("decoding template {} ({})", entry.name, file.display()))?
            .to_rgba8();
        let anchors = entry
            .anchors
            .map(|a| a.map(|[x, y]| Point::new(x, y)));
        catalog.insert(MaskTemplate::new(entry.name, image, anchors));
    }
    log::info!("Loaded {} mask template(s)", catalog.len());
    Ok(catalog)
}
