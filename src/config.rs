use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use maskgen_core::{CodeSelection, MaskingOptions, MultiFacePolicy, RandomPolicy};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

static PROJECT_DIRS: Lazy<Option<ProjectDirs>> =
    Lazy::new(|| ProjectDirs::from("", "", "maskgen"));

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| match option_env!("MASKGEN_CONFIG_PATH") {
    Some(p) => PathBuf::from(p),
    None => PROJECT_DIRS
        .as_ref()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("maskgen.toml")),
});

pub static TEMPLATE_MANIFEST: Lazy<PathBuf> =
    Lazy::new(|| match option_env!("MASKGEN_TEMPLATE_MANIFEST") {
        Some(p) => PathBuf::from(p),
        None => PROJECT_DIRS
            .as_ref()
            .map(|d| d.data_dir().join("templates").join("templates.toml"))
            .unwrap_or_else(|| PathBuf::from("templates/templates.toml")),
    });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    #[default]
    All,
    First,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RandomRoll {
    #[default]
    PerFace,
    PerImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CodeMode {
    #[default]
    Every,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mask_type: String,
    /// Multi-mask code; overrides `mask_type` when non-empty.
    pub code: String,
    pub pattern: String,
    pub pattern_weight: f32,
    pub color: String,
    pub color_weight: f32,
    pub faces: FaceSelection,
    pub random: RandomRoll,
    pub code_mode: CodeMode,
    pub margin: f32,
    pub match_lighting: bool,
    pub inpaint_radius: u32,
    pub templates: Option<PathBuf>,
    pub verbose: bool,
    pub write_original_image: bool,
    pub write_occupancy: bool,
    pub jobs: usize,
    pub seed: Option<u64>,
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        let options = MaskingOptions::default();
        Self {
            mask_type: options.mask_type.to_string(),
            code: String::new(),
            pattern: String::new(),
            pattern_weight: options.pattern_weight,
            color: options.color.unwrap_or_default(),
            color_weight: options.color_weight,
            faces: FaceSelection::default(),
            random: RandomRoll::default(),
            code_mode: CodeMode::default(),
            margin: options.margin,
            match_lighting: options.match_lighting,
            inpaint_radius: options.inpaint_radius,
            templates: None,
            verbose: false,
            write_original_image: false,
            write_occupancy: true,
            jobs: 1,
            seed: None,
            progress: true,
        }
    }
}

impl Config {
    pub fn masking_options(&self) -> Result<MaskingOptions> {
        let mask_type = self
            .mask_type
            .parse()
            .with_context(|| format!("invalid mask_type {:?}", self.mask_type))?;
        Ok(MaskingOptions {
            mask_type,
            pattern: non_empty(&self.pattern),
            pattern_weight: self.pattern_weight,
            color: non_empty(&self.color),
            color_weight: self.color_weight,
            multi_face: match self.faces {
                FaceSelection::All => MultiFacePolicy::AllFaces,
                FaceSelection::First => MultiFacePolicy::FirstFace,
            },
            random_policy: match self.random {
                RandomRoll::PerFace => RandomPolicy::PerFace,
                RandomRoll::PerImage => RandomPolicy::PerImage,
            },
            code_selection: match self.code_mode {
                CodeMode::Every => CodeSelection::Every,
                CodeMode::Random => CodeSelection::Random,
            },
            margin: self.margin,
            match_lighting: self.match_lighting,
            inpaint_radius: self.inpaint_radius,
        })
    }

    pub fn template_manifest(&self) -> &Path {
        self.templates.as_deref().unwrap_or(&TEMPLATE_MANIFEST)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
