pub mod batch;
pub mod catalog;
pub mod config;
pub mod landmarks;

// Re-export core types for convenience
pub use maskgen_core::{
    CompositeResult, MaskError, MaskPlan, MaskRequest, MaskSpecification, MaskType,
    MaskingOptions, Pipeline, TemplateCatalog,
};
