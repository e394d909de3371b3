//! Overlay discovery and random selection.
//!
//! An overlay source is a single image, a directory of images or a glob
//! pattern. It resolves once per run into an [`OverlaySet`]; an
//! [`OverlaySelector`] then hands out random, possibly mirrored, picks and
//! keeps every decoded image so a repeated pick never hits the disk twice.

use image::imageops;
use image::RgbaImage;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Chance that a pick is mirrored horizontally.
const MIRROR_PROBABILITY: f64 = 0.5;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("no overlay images found at {0}")]
    EmptyOverlaySet(String),
    #[error("invalid overlay pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("failed to load overlay {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(source: &str) -> PathBuf {
    let home = || std::env::var_os("HOME").map(PathBuf::from);
    if source == "~" {
        if let Some(h) = home() {
            return h;
        }
    } else if let Some(rest) = source.strip_prefix("~/") {
        if let Some(h) = home() {
            return h.join(rest);
        }
    }
    PathBuf::from(source)
}

/// Resolve a file, directory or glob pattern into the regular files it names.
///
/// Directories expand to all files directly inside them; subdirectories and
/// dotfiles are skipped. The list is sorted and free of duplicates. Matching nothing is
/// an error.
pub fn image_paths(source: &str) -> Result<Vec<PathBuf>, OverlayError> {
    let path = expand_home(source);

    if path.is_file() {
        return Ok(vec![path]);
    }

    let pattern = if path.is_dir() {
        let dir = glob::Pattern::escape(&path.to_string_lossy());
        format!("{}/*", dir.trim_end_matches('/'))
    } else {
        path.to_string_lossy().into_owned()
    };

    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..glob::MatchOptions::new()
    };
    let entries = glob::glob_with(&pattern, options).map_err(|source| OverlayError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable overlay entry");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    paths.dedup();

    if paths.is_empty() {
        return Err(OverlayError::EmptyOverlaySet(pattern));
    }
    Ok(paths)
}

/// The overlay files available to one run.
#[derive(Debug, Clone)]
pub struct OverlaySet {
    paths: Vec<PathBuf>,
}

impl OverlaySet {
    /// Resolve `source` with [`image_paths`].
    pub fn resolve(source: &str) -> Result<Self, OverlayError> {
        let paths = image_paths(source)?;
        tracing::debug!(source = source, count = paths.len(), "resolved overlay set");
        Ok(Self { paths })
    }
}

/// One overlay chosen for one region.
#[derive(Debug, Clone)]
pub struct Pick {
    pub index: usize,
    pub path: PathBuf,
    pub image: RgbaImage,
    pub mirrored: bool,
}

/// Random overlay picker with a per-run decode cache.
pub struct OverlaySelector<'a> {
    set: &'a OverlaySet,
    cache: HashMap<usize, RgbaImage>,
    decodes: usize,
}

impl<'a> OverlaySelector<'a> {
    pub fn new(set: &'a OverlaySet) -> Self {
        Self {
            set,
            cache: HashMap::new(),
            decodes: 0,
        }
    }

    /// Draw a uniformly random overlay, mirrored with probability one half.
    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Pick, OverlayError> {
        let index = rng.gen_range(0..self.set.paths.len());
        let path = self.set.paths[index].clone();
        let mirrored = rng.gen_bool(MIRROR_PROBABILITY);

        let original = self.load(index)?;
        let image = if mirrored {
            imageops::flip_horizontal(original)
        } else {
            original.clone()
        };

        tracing::info!(path = %path.display(), mirrored, "picked overlay");
        Ok(Pick {
            index,
            path,
            image,
            mirrored,
        })
    }

    /// Number of files actually decoded so far.
    pub fn decodes(&self) -> usize {
        self.decodes
    }

    fn load(&mut self, index: usize) -> Result<&RgbaImage, OverlayError> {
        if !self.cache.contains_key(&index) {
            let image = load_rgba(&self.set.paths[index])?;
            self.decodes += 1;
            self.cache.insert(index, image);
        } else {
            tracing::debug!(index, "overlay cache hit");
        }
        Ok(&self.cache[&index])
    }
}

/// Decode an overlay as RGBA; formats without alpha become fully opaque.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, OverlayError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| OverlayError::Decode {
            path: path.display().to_string(),
            source,
        })
}
