use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use maskgen::config::{self, CodeMode, Config, FaceSelection, RandomRoll};
use maskgen::{batch, catalog};

#[derive(Parser)]
#[command(name = "maskgen")]
#[command(
    version,
    about = "Synthesize masked-face images from 68-point facial landmarks"
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log geometry decisions and per-directory usage counts
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mask the faces in an image, or in every image of a directory
    Mask(MaskArgs),
    /// List the mask templates in the catalog
    Templates {
        /// Template manifest (templates.toml)
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

#[derive(Args)]
struct MaskArgs {
    /// Image file or directory
    path: PathBuf,
    /// surgical, N95, KN95, cloth, gas, inpaint, random or all
    #[arg(long)]
    mask_type: Option<String>,
    /// Multi-mask code, e.g. "surgical-#ff0000, N95-check_1"
    #[arg(long)]
    code: Option<String>,
    /// Texture for entries without a variation
    #[arg(long)]
    pattern: Option<String>,
    #[arg(long)]
    pattern_weight: Option<f32>,
    /// Hex color for entries without a variation
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    color_weight: Option<f32>,
    #[arg(long, value_enum)]
    faces: Option<FaceSelection>,
    /// When a random mask picks its type
    #[arg(long, value_enum)]
    random: Option<RandomRoll>,
    #[arg(long, value_enum)]
    code_mode: Option<CodeMode>,
    /// Outward footprint margin, as a fraction of face width
    #[arg(long)]
    margin: Option<f32>,
    /// Match texture brightness to the face
    #[arg(long)]
    match_lighting: bool,
    #[arg(long)]
    inpaint_radius: Option<u32>,
    /// Template manifest (templates.toml)
    #[arg(long)]
    templates: Option<PathBuf>,
    /// Also write the unmasked image to the output directory
    #[arg(long)]
    write_original_image: bool,
    /// Skip the occupancy mask files
    #[arg(long)]
    no_occupancy: bool,
    /// Worker threads
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Seed for random mask choices
    #[arg(long)]
    seed: Option<u64>,
    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl MaskArgs {
    fn apply(self, cfg: &mut Config) -> PathBuf {
        if let Some(v) = self.mask_type {
            cfg.mask_type = v;
        }
        if let Some(v) = self.code {
            cfg.code = v;
        }
        if let Some(v) = self.pattern {
            cfg.pattern = v;
        }
        if let Some(v) = self.pattern_weight {
            cfg.pattern_weight = v;
        }
        if let Some(v) = self.color {
            cfg.color = v;
        }
        if let Some(v) = self.color_weight {
            cfg.color_weight = v;
        }
        if let Some(v) = self.faces {
            cfg.faces = v;
        }
        if let Some(v) = self.random {
            cfg.random = v;
        }
        if let Some(v) = self.code_mode {
            cfg.code_mode = v;
        }
        if let Some(v) = self.margin {
            cfg.margin = v;
        }
        if let Some(v) = self.inpaint_radius {
            cfg.inpaint_radius = v;
        }
        if let Some(v) = self.jobs {
            cfg.jobs = v;
        }
        if self.templates.is_some() {
            cfg.templates = self.templates;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        cfg.match_lighting |= self.match_lighting;
        cfg.write_original_image |= self.write_original_image;
        cfg.write_occupancy &= !self.no_occupancy;
        cfg.progress &= !self.no_progress;
        self.path
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    cfg.verbose |= cli.verbose;

    env_logger::builder()
        .filter_level(if cfg.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Mask(args) => {
            let path = args.apply(&mut cfg);
            mask(&cfg, path)
        }
        Commands::Templates { manifest } => list_templates(&cfg, manifest),
        Commands::Config => open_config(cli.config),
    }
}

fn mask(cfg: &Config, path: PathBuf) -> Result<()> {
    info!("Masking {}", path.display());
    let report = batch::run(cfg, &path)?;
    if report.processed == 0 {
        warn!("No image was masked");
    }
    Ok(())
}

fn list_templates(cfg: &Config, manifest: Option<PathBuf>) -> Result<()> {
    let manifest = manifest.unwrap_or_else(|| cfg.template_manifest().to_path_buf());
    let catalog = catalog::load_catalog(&manifest)?;
    if catalog.is_empty() {
        info!("No templates in {}", manifest.display());
        return Ok(());
    }
    for name in catalog.names() {
        let template = catalog.get(name)?;
        let (w, h) = template.image.dimensions();
        println!("{}\t{}x{}", name, w, h);
    }
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.to_path_buf());
    if !config_path.exists() {
        config::save_config(&Config::default(), Some(&config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
