mod config;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::{Config, Tuning};
use headswap_core::pipeline::{self, Detectors, LazyDetector, PipelineOptions, Replacement};
use headswap_core::{BoundingBox, ReplaceMode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "headswap",
    version,
    about = "Find faces in a photo and replace them with random other heads"
)]
struct Cli {
    /// Input image
    infile: PathBuf,

    /// Face overlays: a file, directory or glob [env: HEADSWAP_FACES]
    #[arg(short, long, value_name = "SPEC")]
    faces: Option<String>,

    /// Body overlays for photobombing: a file, directory or glob [env: HEADSWAP_BODIES]
    #[arg(short, long, value_name = "SPEC")]
    bodies: Option<String>,

    /// Output image; format follows the extension
    #[arg(short, long, default_value = "out.jpg")]
    outfile: PathBuf,

    /// Directory containing the Haar cascades [env: HEADSWAP_CASCADE_DIR]
    #[arg(short, long, value_name = "DIR")]
    cascade_path: Option<PathBuf>,

    /// Face cascade file name
    #[arg(long, default_value = "haarcascade_frontalface_alt.xml")]
    face_cascade: String,

    /// Eye cascade file name (only used with --boxes)
    #[arg(long, default_value = "haarcascade_eye.xml")]
    eye_cascade: String,

    /// Cat face cascade file name (only used when no human faces are found)
    #[arg(long, default_value = "haarcascade_frontalcatface.xml")]
    cat_cascade: String,

    /// Skip detection and photobomb the image directly
    #[arg(short, long)]
    photobomb: bool,

    /// Save the output in greyscale
    #[arg(short, long, aliases = ["grayscale", "bw"])]
    greyscale: bool,

    /// Open the output in the system image viewer
    #[arg(short, long)]
    show: bool,

    /// Debug: draw boxes around detected faces, eyes and heads
    #[arg(short = 'x', long)]
    boxes: bool,

    /// Seed the random number generator for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// TOML file with detection and photobomb tuning
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print a JSON report of the run to stdout
    #[arg(long)]
    json: bool,
}

/// Machine-readable summary printed with `--json`.
#[derive(Serialize)]
struct Report<'a> {
    mode: ReplaceMode,
    regions: Vec<BoundingBox>,
    overlays: &'a [Replacement],
    output: &'a Path,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    let tuning = match &cli.config {
        Some(path) => Tuning::load(path)?,
        None => Tuning::default(),
    };

    tracing::debug!(data_dir = %config.data_dir.display(), "loaded environment config");

    let faces = cli.faces.clone().unwrap_or(config.faces);
    let bodies = cli.bodies.clone().unwrap_or(config.bodies);
    let cascade_dir = cli.cascade_path.clone().unwrap_or(config.cascade_dir);
    tracing::debug!(%faces, %bodies, cascade_dir = %cascade_dir.display(), "resolved sources");

    check_path(&cli.infile)?;
    let image = headswap_media::open_image(&cli.infile)
        .with_context(|| format!("failed to open {}", cli.infile.display()))?;

    let face_cascade = cascade_dir.join(&cli.face_cascade);
    if !cli.photobomb {
        check_path(&face_cascade)?;
    }
    let eyes = if cli.boxes && !cli.photobomb {
        let path = cascade_dir.join(&cli.eye_cascade);
        check_path(&path)?;
        Some(LazyDetector::cascade(path, tuning.eye_params()))
    } else {
        None
    };

    let mut detectors = Detectors {
        face: LazyDetector::cascade(face_cascade, tuning.face_params()),
        cat: LazyDetector::cascade(cascade_dir.join(&cli.cat_cascade), tuning.cat_params()),
        eyes,
    };
    let options = PipelineOptions {
        force_photobomb: cli.photobomb,
        draw_boxes: cli.boxes,
        photobomb: tuning.photobomb,
    };
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let outcome = pipeline::run(image, &faces, &bodies, &mut detectors, &options, &mut rng)
        .context("head replacement failed")?;
    tracing::info!(
        mode = %outcome.mode,
        replaced = outcome.replacements.len(),
        "pipeline finished"
    );

    headswap_media::save_image(&outcome.image, &cli.outfile, cli.greyscale)
        .with_context(|| format!("failed to save {}", cli.outfile.display()))?;

    if cli.json {
        let report = Report {
            mode: outcome.mode,
            regions: outcome.replacements.iter().map(|r| r.region).collect(),
            overlays: &outcome.replacements,
            output: &cli.outfile,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} -> {} ({})", cli.infile.display(), cli.outfile.display(), outcome.mode);
    }

    if cli.show {
        headswap_media::show(&cli.outfile).context("failed to open image viewer")?;
    }

    Ok(())
}

/// Fail with a readable message unless `path` is an existing file.
fn check_path(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }
    Ok(())
}
