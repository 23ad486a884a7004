pub mod code;
pub mod compositor;
pub mod error;
pub mod geometry;
pub mod homography;
pub mod inpaint;
pub mod landmarks;
pub mod pipeline;
pub mod raster;
pub mod template;

// Re-export commonly used types
pub use code::{parse_code, MaskRequest, MaskSpecification, MaskType, UsageCounter};
pub use compositor::{composite, BlendWeights, CompositeResult, Compositor};
pub use error::{MaskError, Result};
pub use geometry::{compute_geometry, MaskGeometry, Orientation};
pub use homography::Homography;
pub use landmarks::{BoundingBox, FaceLandmarks, LandmarkProvider, Point, StaticLandmarks};
pub use pipeline::{
    CodeSelection, ImageOutcome, MaskPlan, MaskingOptions, MultiFacePolicy, Pipeline,
    RandomPolicy,
};
pub use template::{MaskTemplate, TemplateCatalog};
