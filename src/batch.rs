use crate::catalog::load_catalog;
use crate::config::Config;
use crate::landmarks::SidecarLandmarks;
use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use maskgen_core::{MaskPlan, Pipeline};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub write_original_image: bool,
    pub write_occupancy: bool,
    pub jobs: usize,
    /// Seeds per-image randomness; entropy when unset.
    pub seed: Option<u64>,
    pub verbose: bool,
    /// Draw a per-image progress bar on stderr.
    pub progress: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            write_original_image: false,
            write_occupancy: true,
            jobs: 1,
            seed: None,
            verbose: false,
            progress: false,
        }
    }
}

impl From<&Config> for BatchSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            write_original_image: cfg.write_original_image,
            write_occupancy: cfg.write_occupancy,
            jobs: cfg.jobs.max(1),
            seed: cfg.seed,
            verbose: cfg.verbose,
            progress: cfg.progress,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Images that produced at least one result.
    pub processed: usize,
    pub results_written: usize,
    /// Images left out, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

impl BatchReport {
    fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.results_written += other.results_written;
        self.skipped.extend(other.skipped);
    }
}

#[derive(Debug, Clone)]
struct ImageJob {
    input: PathBuf,
    out_dir: PathBuf,
    seq: u64,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Directory results land in `<dir>_masked`, file results next to the file.
pub fn output_root(input: &Path) -> PathBuf {
    if input.is_dir() {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        input.with_file_name(format!("{}_masked", name))
    } else {
        input.parent().map(Path::to_path_buf).unwrap_or_default()
    }
}

/// `<stem>_<label>[_<face>].<ext>`
pub fn output_name(stem: &str, label: &str, face: Option<usize>, ext: &str) -> String {
    match face {
        Some(i) => format!("{}_{}_{}.{}", stem, label, i, ext),
        None => format!("{}_{}.{}", stem, label, ext),
    }
}

/// `<stem>_<label>[_<face>]_mask.png`
pub fn occupancy_name(stem: &str, label: &str, face: Option<usize>) -> String {
    let name = output_name(stem, label, face, "png");
    format!("{}_mask.png", name.trim_end_matches(".png"))
}

/// Repeated labels on the same face get `_2`, `_3`, ... so no result
/// overwrites another.
fn unique_labels<'a>(entries: impl IntoIterator<Item = (&'a str, usize)>) -> Vec<String> {
    let mut taken = HashSet::new();
    entries
        .into_iter()
        .map(|(label, face)| {
            let mut name = label.to_string();
            let mut n = 1;
            while !taken.insert((name.clone(), face)) {
                n += 1;
                name = format!("{}_{}", label, n);
            }
            name
        })
        .collect()
}

fn progress_bar(total: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█░-"));
    }
    pb
}

/// Images grouped by directory: the top level first, then one level of
/// subdirectories.
fn collect_jobs(input: &Path) -> Result<Vec<Vec<ImageJob>>> {
    if input.is_file() {
        if !is_image(input) {
            bail!("{} is not a supported image", input.display());
        }
        return Ok(vec![vec![ImageJob {
            input: input.to_path_buf(),
            out_dir: output_root(input),
            seq: 0,
        }]]);
    }

    let root = output_root(input);
    let mut groups: BTreeMap<PathBuf, Vec<ImageJob>> = BTreeMap::new();
    let mut seq = 0;
    for entry in WalkDir::new(input)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("walking {}", input.display()))?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let rel_dir = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(input).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        groups.entry(rel_dir.clone()).or_default().push(ImageJob {
            input: entry.path().to_path_buf(),
            out_dir: root.join(rel_dir),
            seq,
        });
        seq += 1;
    }
    Ok(groups.into_values().collect())
}

/// Mask every image under `input` and write the results.
pub fn run_batch(
    pipeline: &Pipeline,
    plan: &MaskPlan,
    input: &Path,
    settings: &BatchSettings,
) -> Result<BatchReport> {
    if !input.exists() {
        bail!("{} does not exist", input.display());
    }
    let input = input
        .canonicalize()
        .with_context(|| format!("resolving {}", input.display()))?;

    let groups = collect_jobs(&input)?;
    let total: usize = groups.iter().map(Vec::len).sum();
    let pb = progress_bar(total as u64, settings.progress);

    let mut report = BatchReport::default();
    for group in groups {
        if let Some(dir) = group.first().and_then(|j| j.input.parent()) {
            info!("Processing {} image(s) in {}", group.len(), dir.display());
            pb.set_message(dir.display().to_string());
        }
        report.merge(run_group(pipeline, plan, &group, settings, &pb)?);
        if settings.verbose {
            for (label, n) in plan.usage() {
                debug!("  {}: {}", label, n);
            }
        }
    }
    pb.finish_and_clear();

    info!(
        "Done: {} image(s) masked, {} result(s) written, {} skipped",
        report.processed,
        report.results_written,
        report.skipped.len()
    );
    for (label, n) in plan.usage() {
        info!("  {}: {}", label, n);
    }
    Ok(report)
}

fn run_group(
    pipeline: &Pipeline,
    plan: &MaskPlan,
    jobs: &[ImageJob],
    settings: &BatchSettings,
    pb: &ProgressBar,
) -> Result<BatchReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.jobs.clamp(1, jobs.len().max(1)))
        .build()
        .map_err(|e| anyhow!("Failed to create thread pool: {}", e))?;

    let outcomes: Vec<Result<usize>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let outcome = process_one(pipeline, plan, job, settings);
                pb.inc(1);
                outcome
            })
            .collect()
    });

    Ok(jobs
        .iter()
        .zip(outcomes)
        .fold(BatchReport::default(), |mut report, (job, outcome)| {
            record(&mut report, job, outcome);
            report
        }))
}

fn record(report: &mut BatchReport, job: &ImageJob, outcome: Result<usize>) {
    match outcome {
        Ok(0) => {
            warn!("{}: no mask could be rendered", job.input.display());
            report
                .skipped
                .push((job.input.clone(), "no mask could be rendered".to_string()));
        }
        Ok(n) => {
            report.processed += 1;
            report.results_written += n;
        }
        Err(e) => {
            warn!("{}: {:#}", job.input.display(), e);
            report.skipped.push((job.input.clone(), format!("{:#}", e)));
        }
    }
}

fn process_one(
    pipeline: &Pipeline,
    plan: &MaskPlan,
    job: &ImageJob,
    settings: &BatchSettings,
) -> Result<usize> {
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(job.seq)),
        None => StdRng::from_entropy(),
    };

    let image = image::open(&job.input)
        .with_context(|| format!("decoding {}", job.input.display()))?
        .to_rgb8();
    let provider = SidecarLandmarks::for_image(&job.input)?;
    let outcome = pipeline.process_image(image, &provider, plan, &mut rng)?;
    for (label, err) in &outcome.failures {
        warn!("{}: {}: {}", job.input.display(), label, err);
    }

    std::fs::create_dir_all(&job.out_dir)
        .with_context(|| format!("creating {}", job.out_dir.display()))?;

    let stem = job
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = job
        .input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    let faces: BTreeSet<usize> = outcome.results.iter().map(|r| r.face_index).collect();
    let multi_face = faces.len() > 1;

    let labels = unique_labels(
        outcome
            .results
            .iter()
            .map(|r| (r.mask_label.as_str(), r.face_index)),
    );
    for (result, label) in outcome.results.iter().zip(&labels) {
        let face = multi_face.then_some(result.face_index);
        let out = job.out_dir.join(output_name(&stem, label, face, &ext));
        result
            .masked_image
            .save(&out)
            .with_context(|| format!("writing {}", out.display()))?;

        if settings.write_occupancy {
            let out = job
                .out_dir
                .join(occupancy_name(&stem, label, face));
            result
                .occupancy_mask
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
        }
    }

    if settings.write_original_image && !outcome.results.is_empty() {
        let out = job.out_dir.join(format!("{}.{}", stem, ext));
        if out != job.input {
            outcome
                .original
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
        }
    }

    debug!(
        "{}: {} result(s) from {} face(s)",
        job.input.display(),
        outcome.results.len(),
        faces.len()
    );
    Ok(outcome.results.len())
}

/// Load the catalog, validate everything the run needs, then mask `input`.
pub fn run(cfg: &Config, input: &Path) -> Result<BatchReport> {
    let options = cfg.masking_options()?;
    let catalog = load_catalog(cfg.template_manifest())?;
    let plan = if cfg.code.trim().is_empty() {
        MaskPlan::from_request(options.mask_type)
    } else {
        MaskPlan::from_code(&cfg.code).context("invalid mask code")?
    };
    let pipeline = Pipeline::new(&catalog, options).context("invalid masking options")?;
    pipeline
        .validate_plan(&plan)
        .context("mask code refers to an unusable template or color")?;

    run_batch(&pipeline, &plan, input, &BatchSettings::from(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_outputs() {
        assert_eq!(output_name("img", "surgical", None, "jpg"), "img_surgical.jpg");
        assert_eq!(output_name("img", "N95_ff0000", Some(1), "png"), "img_N95_ff0000_1.png");
        assert_eq!(occupancy_name("img", "gas", Some(0)), "img_gas_0_mask.png");
        assert_eq!(occupancy_name("img", "cloth_check_1", None), "img_cloth_check_1_mask.png");
    }

    #[test]
    fn repeated_labels_get_a_counter() {
        let labels = unique_labels([
            ("gas", 0),
            ("surgical", 0),
            ("gas", 0),
            ("gas", 1),
            ("gas", 0),
            ("gas_2", 0),
        ]);
        assert_eq!(labels, vec!["gas", "surgical", "gas_2", "gas", "gas_3", "gas_2_2"]);
    }

    #[test]
    fn recognizes_images() {
        assert!(is_image(Path::new("a/b.JPG")));
        assert!(is_image(Path::new("c.webp")));
        assert!(!is_image(Path::new("c.png.landmarks.json")));
        assert!(!is_image(Path::new("README")));
    }

    #[test]
    fn directory_outputs_go_to_a_sibling() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let photos = dir.path().join("photos");
        std::fs::create_dir(&photos)?;
        assert_eq!(output_root(&photos), dir.path().join("photos_masked"));
        let file = photos.join("a.png");
        std::fs::write(&file, b"")?;
        assert_eq!(output_root(&file), photos);
        Ok(())
    }

    #[test]
    fn walks_one_level_deep() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("in");
        std::fs::create_dir_all(root.join("sub/deeper"))?;
        for f in ["a.png", "b.txt", "sub/c.jpg", "sub/deeper/d.png"] {
            std::fs::write(root.join(f), b"")?;
        }

        let groups = collect_jobs(&root)?;
        let found: Vec<Vec<PathBuf>> = groups
            .iter()
            .map(|g| g.iter().map(|j| j.input.clone()).collect())
            .collect();
        assert_eq!(
            found,
            vec![vec![root.join("a.png")], vec![root.join("sub/c.jpg")]]
        );
        assert_eq!(groups[1][0].out_dir, dir.path().join("in_masked").join("sub"));
        Ok(())
    }
}
