use anyhow::{Context, Result};
use image::RgbImage;
use maskgen_core::{BoundingBox, FaceLandmarks, LandmarkProvider, Point};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One face in a landmark sidecar file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FaceRecord {
    Points { points: Vec<[f32; 2]> },
    /// `[x, y, width, height]`; filled with the mean face shape.
    Bbox { bbox: [f32; 4] },
}

impl FaceRecord {
    fn into_landmarks(self) -> maskgen_core::Result<FaceLandmarks> {
        match self {
            FaceRecord::Points { points } => {
                FaceLandmarks::new(points.into_iter().map(|[x, y]| Point::new(x, y)).collect())
            }
            FaceRecord::Bbox { bbox: [x, y, w, h] } => {
                Ok(FaceLandmarks::from_mean_shape(BoundingBox::new(x, y, w, h)))
            }
        }
    }
}

/// `photo.jpg` → `photo.jpg.landmarks.json`
pub fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = image.file_name().unwrap_or_default().to_os_string();
    name.push(".landmarks.json");
    image.with_file_name(name)
}

/// Landmarks precomputed by an external 68-point detector, read from the
/// JSON file next to the image.
#[derive(Debug, Clone, Default)]
pub struct SidecarLandmarks {
    faces: Vec<FaceLandmarks>,
}

impl SidecarLandmarks {
    /// A missing sidecar means the detector found no face.
    pub fn for_image(image: &Path) -> Result<Self> {
        let path = sidecar_path(image);
        if !path.exists() {
            log::debug!("no landmark sidecar for {}", image.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<FaceRecord> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let faces = records
            .into_iter()
            .map(FaceRecord::into_landmarks)
            .collect::<maskgen_core::Result<Vec<_>>>()
            .with_context(|| format!("invalid landmarks in {}", path.display()))?;
        Ok(Self { faces })
    }
}

impl LandmarkProvider for SidecarLandmarks {
    fn detect_landmarks(&self, _image: &RgbImage) -> maskgen_core::Result<Vec<FaceLandmarks>> {
        Ok(self.faces.clone())
    }
}
