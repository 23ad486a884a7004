use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MaskError {
    #[error("no face detected in image")]
    NoFace,

    #[error("invalid mask code: {0}")]
    InvalidCode(String),

    #[error("unsupported mask type: {0}")]
    UnsupportedType(String),

    #[error("mask template not found: {0}")]
    MissingTemplate(String),

    #[error("invalid hex color: {0}")]
    InvalidColor(String),

    #[error("{name} must be between 0 and 1, got {value}")]
    InvalidWeight { name: &'static str, value: f32 },

    #[error("expected 68 landmarks, got {count}")]
    InvalidLandmarks { count: usize },

    #[error("degenerate mask geometry: {0}")]
    DegenerateGeometry(String),

    #[error("landmark provider failed: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, MaskError>;
