use anyhow::{bail, Context, Result};
use headswap_core::{DetectParams, PhotobombParams};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_CASCADE_DIR: &str = "/usr/share/opencv4/haarcascades";

/// Overlay and cascade locations, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the bundled overlay images (default: ./data).
    pub data_dir: PathBuf,
    /// Face overlay file, directory or glob.
    pub faces: String,
    /// Body overlay file, directory or glob.
    pub bodies: String,
    /// Directory holding the OpenCV Haar cascade XML files.
    pub cascade_dir: PathBuf,
}

impl Config {
    /// Load configuration from `HEADSWAP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = get("HEADSWAP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let faces = get("HEADSWAP_FACES").unwrap_or_else(|| overlay_glob(&data_dir, "faces"));
        let bodies = get("HEADSWAP_BODIES").unwrap_or_else(|| overlay_glob(&data_dir, "bodies"));

        Self {
            faces,
            bodies,
            cascade_dir: get("HEADSWAP_CASCADE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CASCADE_DIR)),
            data_dir,
        }
    }
}

fn overlay_glob(data_dir: &Path, kind: &str) -> String {
    data_dir.join(kind).join("*.png").to_string_lossy().into_owned()
}

/// Per-cascade overrides from the tuning file. Unset keys keep the
/// cascade's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageTuning {
    pub scale_factor: Option<f64>,
    pub min_neighbors: Option<u32>,
    pub min_size: Option<u32>,
}

impl StageTuning {
    fn apply(&self, base: DetectParams, max_dimension: Option<u32>) -> DetectParams {
        DetectParams {
            scale_factor: self.scale_factor.unwrap_or(base.scale_factor),
            min_neighbors: self.min_neighbors.unwrap_or(base.min_neighbors),
            min_size: self.min_size.unwrap_or(base.min_size),
            max_dimension: max_dimension.unwrap_or(base.max_dimension),
        }
    }
}

/// Detection and placement tuning, read from the `--config` TOML file.
///
/// ```toml
/// max_dimension = 1600
///
/// [face]
/// scale_factor = 1.2
/// min_neighbors = 4
///
/// [photobomb]
/// width_fraction = 0.4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tuning {
    pub face: StageTuning,
    pub cat: StageTuning,
    pub eyes: StageTuning,
    pub max_dimension: Option<u32>,
    pub photobomb: PhotobombParams,
}

impl Tuning {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let tuning = Self::parse(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded tuning");
        Ok(tuning)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let tuning: Tuning = toml::from_str(text)?;
        tuning.validate()?;
        Ok(tuning)
    }

    fn validate(&self) -> Result<()> {
        for (name, stage) in [("face", &self.face), ("cat", &self.cat), ("eyes", &self.eyes)] {
            if let Some(s) = stage.scale_factor {
                if s <= 1.0 {
                    bail!("[{name}] scale_factor must be greater than 1, got {s}");
                }
            }
        }
        let fractions = [
            ("width_fraction", self.photobomb.width_fraction),
            ("max_height_fraction", self.photobomb.max_height_fraction),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                bail!("[photobomb] {name} must be in (0, 1], got {value}");
            }
        }
        Ok(())
    }

    pub fn face_params(&self) -> DetectParams {
        self.face.apply(DetectParams::default(), self.max_dimension)
    }

    pub fn cat_params(&self) -> DetectParams {
        self.cat.apply(DetectParams::default(), self.max_dimension)
    }

    pub fn eye_params(&self) -> DetectParams {
        self.eyes.apply(DetectParams::eyes(), self.max_dimension)
    }
}
