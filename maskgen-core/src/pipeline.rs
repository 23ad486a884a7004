use crate::code::{parse_code, parse_hex_color, MaskRequest, MaskSpecification, UsageCounter};
use crate::compositor::{BlendWeights, CompositeResult, Compositor, DEFAULT_INPAINT_RADIUS};
use crate::error::{MaskError, Result};
use crate::geometry::{compute_geometry, resolve_mask_type};
use crate::landmarks::LandmarkProvider;
use crate::template::TemplateCatalog;
use image::RgbImage;
use rand::Rng;

pub const DEFAULT_COLOR: &str = "#0473e2";
pub const DEFAULT_MARGIN: f32 = 0.04;

/// Which detected faces receive masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiFacePolicy {
    #[default]
    AllFaces,
    /// Stop after the first face that produced at least one result.
    FirstFace,
}

/// How often a `random` mask re-rolls its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RandomPolicy {
    #[default]
    PerFace,
    PerImage,
}

/// Which mask specifications each image receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeSelection {
    #[default]
    Every,
    /// One specification per image, picked uniformly.
    Random,
}

/// Everything the masking entry point needs besides the image, the faces
/// and the specifications.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskingOptions {
    pub mask_type: MaskRequest,
    /// Texture applied when a specification names neither color nor texture.
    pub pattern: Option<String>,
    pub pattern_weight: f32,
    /// Color applied when a specification names neither color nor texture.
    pub color: Option<String>,
    pub color_weight: f32,
    pub multi_face: MultiFacePolicy,
    pub random_policy: RandomPolicy,
    pub code_selection: CodeSelection,
    /// Outward footprint expansion, as a fraction of the face width.
    pub margin: f32,
    pub match_lighting: bool,
    pub inpaint_radius: u32,
}

impl Default for MaskingOptions {
    fn default() -> Self {
        Self {
            mask_type: MaskRequest::default(),
            pattern: None,
            pattern_weight: 0.5,
            color: Some(DEFAULT_COLOR.to_string()),
            color_weight: 0.5,
            multi_face: MultiFacePolicy::default(),
            random_policy: RandomPolicy::default(),
            code_selection: CodeSelection::default(),
            margin: DEFAULT_MARGIN,
            match_lighting: false,
            inpaint_radius: DEFAULT_INPAINT_RADIUS,
        }
    }
}

impl MaskingOptions {
    /// Fill a bare specification in with the global pattern and color.
    pub fn resolve(&self, spec: &MaskSpecification) -> MaskSpecification {
        if !spec.is_bare() {
            return spec.clone();
        }
        MaskSpecification {
            mask_type: spec.mask_type,
            color: self.color.clone(),
            texture: self.pattern.clone(),
        }
    }

    fn weights(&self) -> Result<BlendWeights> {
        BlendWeights::new(self.pattern_weight, self.color_weight)
    }
}

/// The specifications to render per image, with their usage counts.
#[derive(Debug)]
pub struct MaskPlan {
    specs: Vec<MaskSpecification>,
    counter: UsageCounter,
}

impl MaskPlan {
    pub fn from_code(code: &str) -> Result<Self> {
        let (specs, counter) = parse_code(code)?;
        Ok(Self { specs, counter })
    }

    pub fn from_request(request: MaskRequest) -> Self {
        let specs = request.specifications();
        let counter = UsageCounter::new(specs.len());
        Self { specs, counter }
    }

    pub fn specs(&self) -> &[MaskSpecification] {
        &self.specs
    }

    pub fn counter(&self) -> &UsageCounter {
        &self.counter
    }

    /// `(label, times used)` per specification.
    pub fn usage(&self) -> Vec<(String, u64)> {
        self.specs
            .iter()
            .map(MaskSpecification::label)
            .zip(self.counter.snapshot())
            .collect()
    }
}

/// Per-image output: one result per rendered (face, specification) pair.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub original: RgbImage,
    pub results: Vec<CompositeResult>,
    /// Specifications that could not be rendered, by label.
    pub failures: Vec<(String, MaskError)>,
}

/// Detect faces → compute geometry → composite, for every requested mask.
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    catalog: &'a TemplateCatalog,
    options: MaskingOptions,
    weights: BlendWeights,
}

impl<'a> Pipeline<'a> {
    pub fn new(catalog: &'a TemplateCatalog, options: MaskingOptions) -> Result<Self> {
        let weights = options.weights()?;
        if let Some(color) = options.color.as_deref() {
            parse_hex_color(color)?;
        }
        Ok(Self {
            catalog,
            options,
            weights,
        })
    }

    pub fn options(&self) -> &MaskingOptions {
        &self.options
    }

    /// Check up front that every texture the plan can ask for is in the
    /// catalog.
    pub fn validate_plan(&self, plan: &MaskPlan) -> Result<()> {
        for spec in plan.specs() {
            let resolved = self.options.resolve(spec);
            if let Some(name) = resolved.texture.as_deref() {
                self.catalog.get(name)?;
            }
            if let Some(color) = resolved.color.as_deref() {
                parse_hex_color(color)?;
            }
        }
        Ok(())
    }

    /// Mask every selected face of `image` with the plan's specifications.
    ///
    /// Fails with [`MaskError::NoFace`] when the provider finds no face.
    /// Failures of single specifications are collected in the outcome.
    pub fn process_image<P, R>(
        &self,
        image: RgbImage,
        provider: &P,
        plan: &MaskPlan,
        rng: &mut R,
    ) -> Result<ImageOutcome>
    where
        P: LandmarkProvider + ?Sized,
        R: Rng + ?Sized,
    {
        let faces = provider.detect_landmarks(&image)?;
        if faces.is_empty() {
            return Err(MaskError::NoFace);
        }
        log::debug!("{} face(s) detected", faces.len());

        let selected: Vec<usize> = match self.options.code_selection {
            CodeSelection::Every => (0..plan.specs().len()).collect(),
            CodeSelection::Random if plan.specs().is_empty() => vec![],
            CodeSelection::Random => vec![rng.gen_range(0..plan.specs().len())],
        };

        let per_image: Vec<_> = plan
            .specs()
            .iter()
            .map(|s| resolve_mask_type(s.mask_type, rng))
            .collect();

        let compositor = Compositor::new(self.catalog, self.weights)
            .with_lighting_match(self.options.match_lighting)
            .with_inpaint_radius(self.options.inpaint_radius);

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (face_index, face) in faces.iter().enumerate() {
            let before = results.len();
            for &idx in &selected {
                let requested = &plan.specs()[idx];
                let spec = self.options.resolve(requested);
                let mask_type = match self.options.random_policy {
                    RandomPolicy::PerImage => per_image[idx],
                    RandomPolicy::PerFace => resolve_mask_type(spec.mask_type, rng),
                };

                let rendered = compute_geometry(
                    face,
                    mask_type,
                    image.dimensions(),
                    self.options.margin,
                )
                .and_then(|geometry| compositor.composite(&image, &geometry, &spec));

                match rendered {
                    Ok(mut result) => {
                        // name by the entry as requested, not by the filled-in defaults
                        result.mask_label = requested.with_type(result.mask_type).label();
                        result.face_index = face_index;
                        plan.counter().increment(idx);
                        results.push(result);
                    }
                    Err(e) => {
                        let label = requested.with_type(mask_type).label();
                        log::debug!("face {}: {} failed: {}", face_index, label, e);
                        failures.push((label, e));
                    }
                }
            }
            if self.options.multi_face == MultiFacePolicy::FirstFace && results.len() > before {
                break;
            }
        }

        Ok(ImageOutcome {
            original: image,
            results,
            failures,
        })
    }
}
