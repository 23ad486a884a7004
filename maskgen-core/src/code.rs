//! Mask types, mask specifications and the compact "mask code" grammar:
//!
//! ```text
//! code      := entry ("," entry)*
//! entry     := type | type "-" variation
//! variation := "#" hex6 | texture-id
//! ```
//!
//! Whitespace is insignificant anywhere in a code.

use crate::error::{MaskError, Result};
use image::Rgb;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskType {
    Surgical,
    N95,
    KN95,
    Cloth,
    Gas,
    Inpaint,
    Random,
}

impl MaskType {
    /// Concrete types a `random` mask or the `all` request may resolve to.
    pub const PAINTABLE: [MaskType; 5] = [
        MaskType::Surgical,
        MaskType::N95,
        MaskType::KN95,
        MaskType::Cloth,
        MaskType::Gas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskType::Surgical => "surgical",
            MaskType::N95 => "N95",
            MaskType::KN95 => "KN95",
            MaskType::Cloth => "cloth",
            MaskType::Gas => "gas",
            MaskType::Inpaint => "inpaint",
            MaskType::Random => "random",
        }
    }
}

impl fmt::Display for MaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskType {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "surgical" => Ok(MaskType::Surgical),
            "n95" => Ok(MaskType::N95),
            "kn95" => Ok(MaskType::KN95),
            "cloth" => Ok(MaskType::Cloth),
            "gas" => Ok(MaskType::Gas),
            "inpaint" => Ok(MaskType::Inpaint),
            "random" => Ok(MaskType::Random),
            _ => Err(MaskError::UnsupportedType(s.to_string())),
        }
    }
}

/// Top-level mask selection: one type, or every paintable type once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskRequest {
    Single(MaskType),
    All,
}

impl MaskRequest {
    /// Bare specifications (no color, no texture) for this request.
    pub fn specifications(&self) -> Vec<MaskSpecification> {
        match self {
            MaskRequest::Single(t) => vec![MaskSpecification::bare(*t)],
            MaskRequest::All => MaskType::PAINTABLE
                .iter()
                .map(|t| MaskSpecification::bare(*t))
                .collect(),
        }
    }
}

impl Default for MaskRequest {
    fn default() -> Self {
        MaskRequest::Single(MaskType::Surgical)
    }
}

impl FromStr for MaskRequest {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(MaskRequest::All);
        }
        s.parse().map(MaskRequest::Single)
    }
}

impl fmt::Display for MaskRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskRequest::Single(t) => t.fmt(f),
            MaskRequest::All => f.write_str("all"),
        }
    }
}

/// One requested mask variant.
///
/// `color` keeps the hex string verbatim (with its `#`); `texture` names a
/// template in the catalog. When both are `None` the caller's global
/// defaults apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskSpecification {
    pub mask_type: MaskType,
    pub color: Option<String>,
    pub texture: Option<String>,
}

impl MaskSpecification {
    pub fn bare(mask_type: MaskType) -> Self {
        Self {
            mask_type,
            color: None,
            texture: None,
        }
    }

    pub fn is_bare(&self) -> bool {
        self.color.is_none() && self.texture.is_none()
    }

    /// Name identifying this variant in output file names.
    pub fn label(&self) -> String {
        match (&self.color, &self.texture) {
            (Some(c), _) => format!("{}_{}", self.mask_type, c.trim_start_matches('#')),
            (None, Some(t)) => format!("{}_{}", self.mask_type, t),
            (None, None) => self.mask_type.to_string(),
        }
    }

    pub fn with_type(&self, mask_type: MaskType) -> Self {
        Self {
            mask_type,
            ..self.clone()
        }
    }
}

/// Parse a `#rrggbb` color.
pub fn parse_hex_color(s: &str) -> Result<Rgb<u8>> {
    let hex = s
        .strip_prefix('#')
        .ok_or_else(|| MaskError::InvalidColor(s.to_string()))?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MaskError::InvalidColor(s.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| MaskError::InvalidColor(s.to_string()))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Parse a mask code into its specifications and a zeroed usage counter with
/// one slot per specification. An `all` entry expands to one specification
/// per paintable type, each carrying the entry's variation.
pub fn parse_code(code: &str) -> Result<(Vec<MaskSpecification>, UsageCounter)> {
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(MaskError::InvalidCode("empty mask code".to_string()));
    }

    let mut specs = Vec::new();
    for entry in compact.split(',') {
        if entry.is_empty() {
            return Err(MaskError::InvalidCode(format!("empty entry in {:?}", code)));
        }
        let (type_name, variation) = match entry.split_once('-') {
            Some((t, v)) => (t, Some(v)),
            None => (entry, None),
        };

        let request: MaskRequest = type_name.parse().map_err(|_| {
            MaskError::InvalidCode(format!("unknown mask type {:?} in entry {:?}", type_name, entry))
        })?;

        let (color, texture) = match variation {
            None => (None, None),
            Some("") => {
                return Err(MaskError::InvalidCode(format!(
                    "missing variation after '-' in entry {:?}",
                    entry
                )))
            }
            Some(v) if v.contains('#') => {
                parse_hex_color(v).map_err(|_| {
                    MaskError::InvalidCode(format!("malformed color {:?} in entry {:?}", v, entry))
                })?;
                (Some(v.to_string()), None)
            }
            Some(v) => (None, Some(v.to_string())),
        };

        for mut spec in request.specifications() {
            spec.color = color.clone();
            spec.texture = texture.clone();
            specs.push(spec);
        }
    }

    let counter = UsageCounter::new(specs.len());
    Ok((specs, counter))
}

/// Per-specification usage counts, safe to bump from several workers.
#[derive(Debug, Default)]
pub struct UsageCounter {
    counts: Vec<AtomicU64>,
}

impl UsageCounter {
    pub fn new(len: usize) -> Self {
        Self {
            counts: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Out-of-range indices are ignored.
    pub fn increment(&self, idx: usize) {
        if let Some(c) = self.counts.get(idx) {
            c.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}
