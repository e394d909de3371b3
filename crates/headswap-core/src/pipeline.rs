//! The replace-or-photobomb fallback chain.
//!
//! `TryFace → TryCatFace → Photobomb → Done`. Each detector stage either
//! finds regions and pastes a head over every one of them, or hands over to
//! the next stage. Photobomb always succeeds once a body overlay exists.

use crate::cascade::CascadeError;
use crate::compositor::paste;
use crate::detector::{luma_bt601, CascadeDetector, DetectParams, RegionDetector};
use crate::draw::{draw_box, BOX_THICKNESS, EYE_BOX, FACE_BOX, HEAD_BOX};
use crate::overlay::{OverlayError, OverlaySelector, OverlaySet};
use crate::photobomb::{photobomb, PhotobombParams};
use crate::region::head_box;
use crate::resize::resize_to_width;
use crate::types::{BoundingBox, ReplaceMode};
use image::{GrayImage, RgbImage};
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TryFace,
    TryCatFace,
    Photobomb,
    Done,
}

type DetectorInit<'a> = Box<dyn FnOnce() -> Result<Box<dyn RegionDetector + 'a>, CascadeError> + 'a>;

/// A detector that is only built the first time a stage needs it.
///
/// Loading a cascade means parsing a large XML file, so the cat-face
/// cascade is never touched when the face stage already succeeded.
pub struct LazyDetector<'a> {
    init: Option<DetectorInit<'a>>,
    detector: Option<Box<dyn RegionDetector + 'a>>,
}

impl<'a> LazyDetector<'a> {
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn RegionDetector + 'a>, CascadeError> + 'a,
    {
        Self {
            init: Some(Box::new(init)),
            detector: None,
        }
    }

    /// Wrap an already constructed detector.
    pub fn ready(detector: impl RegionDetector + 'a) -> Self {
        Self {
            init: None,
            detector: Some(Box::new(detector)),
        }
    }

    /// Load the cascade at `path` on first use.
    pub fn cascade(path: PathBuf, params: DetectParams) -> Self {
        Self::new(move || {
            let detector = CascadeDetector::load(path, params)?;
            Ok(Box::new(detector) as Box<dyn RegionDetector + 'a>)
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.detector.is_some()
    }

    /// Build the detector if needed and borrow it.
    pub fn get(&mut self) -> Result<&(dyn RegionDetector + 'a), CascadeError> {
        if self.detector.is_none() {
            let init = self
                .init
                .take()
                .ok_or_else(|| CascadeError::Malformed("detector failed to load earlier".into()))?;
            self.detector = Some(init()?);
        }
        self.detector
            .as_deref()
            .ok_or_else(|| CascadeError::Malformed("detector unavailable".into()))
    }
}

/// The detectors one run may use. `eyes` is only consulted when drawing
/// debug boxes.
pub struct Detectors<'a> {
    pub face: LazyDetector<'a>,
    pub cat: LazyDetector<'a>,
    pub eyes: Option<LazyDetector<'a>>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Skip both detectors and go straight to the photobomb.
    pub force_photobomb: bool,
    /// Draw detected, eye and head boxes onto the output.
    pub draw_boxes: bool,
    pub photobomb: PhotobombParams,
}

/// One overlay pasted onto the image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replacement {
    /// The detected region, or the body placement for a photobomb.
    pub region: BoundingBox,
    /// Where the overlay was pasted, before clipping.
    pub placed: BoundingBox,
    pub overlay: PathBuf,
    pub mirrored: bool,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub image: RgbImage,
    pub mode: ReplaceMode,
    pub replacements: Vec<Replacement>,
}

/// Run the fallback chain on `image`.
///
/// `faces` and `bodies` are overlay sources as accepted by
/// [`crate::overlay::image_paths`]. Face overlays are resolved as soon as
/// detection starts, body overlays only when the chain reaches the
/// photobomb stage.
pub fn run<R: Rng + ?Sized>(
    mut image: RgbImage,
    faces: &str,
    bodies: &str,
    detectors: &mut Detectors<'_>,
    options: &PipelineOptions,
    rng: &mut R,
) -> Result<Outcome, PipelineError> {
    let mut stage = if options.force_photobomb {
        Stage::Photobomb
    } else {
        Stage::TryFace
    };
    let mut mode = ReplaceMode::Photobomb;
    let mut replacements = Vec::new();

    let mut gray: Option<GrayImage> = None;
    let mut face_set: Option<OverlaySet> = None;

    while stage != Stage::Done {
        tracing::debug!(?stage, "pipeline stage");
        stage = match stage {
            Stage::TryFace | Stage::TryCatFace => {
                let (detector, found_mode, next) = if stage == Stage::TryFace {
                    (&mut detectors.face, ReplaceMode::Face, Stage::TryCatFace)
                } else {
                    (&mut detectors.cat, ReplaceMode::Cat, Stage::Photobomb)
                };

                let set = match face_set.take() {
                    Some(set) => set,
                    None => OverlaySet::resolve(faces)?,
                };
                let gray = gray.get_or_insert_with(|| luma_bt601(&image));
                let regions = detector.get()?.detect(gray);
                tracing::info!(mode = %found_mode, count = regions.len(), "detected regions");

                if regions.is_empty() {
                    face_set = Some(set);
                    next
                } else {
                    replacements = replace_regions(
                        &mut image,
                        gray,
                        &regions,
                        &set,
                        detectors.eyes.as_mut().filter(|_| options.draw_boxes),
                        options.draw_boxes,
                        rng,
                    )?;
                    mode = found_mode;
                    Stage::Done
                }
            }
            Stage::Photobomb => {
                if !options.force_photobomb {
                    tracing::info!("no faces or cat faces found, photobombing");
                }
                let set = OverlaySet::resolve(bodies)?;
                let mut selector = OverlaySelector::new(&set);
                let pick = selector.pick(rng)?;
                if let Some(placed) = photobomb(&mut image, &pick.image, &options.photobomb, rng) {
                    replacements.push(Replacement {
                        region: placed,
                        placed,
                        overlay: pick.path,
                        mirrored: pick.mirrored,
                    });
                }
                mode = ReplaceMode::Photobomb;
                Stage::Done
            }
            Stage::Done => Stage::Done,
        };
    }

    Ok(Outcome {
        image,
        mode,
        replacements,
    })
}

/// Paste a random head over every region, enlarged from face to head size.
fn replace_regions<R: Rng + ?Sized>(
    image: &mut RgbImage,
    gray: &GrayImage,
    regions: &[BoundingBox],
    set: &OverlaySet,
    mut eyes: Option<&mut LazyDetector<'_>>,
    draw_boxes: bool,
    rng: &mut R,
) -> Result<Vec<Replacement>, PipelineError> {
    let mut selector = OverlaySelector::new(set);
    let mut replacements = Vec::with_capacity(regions.len());

    for region in regions {
        if draw_boxes {
            draw_box(image, region, FACE_BOX, BOX_THICKNESS);
            if let Some(eyes) = eyes.as_deref_mut() {
                for eye in eyes.get()?.detect_in(gray, region) {
                    draw_box(image, &eye, EYE_BOX, BOX_THICKNESS);
                }
            }
        }

        let pick = selector.pick(rng)?;
        let head = head_box(region);
        if draw_boxes {
            draw_box(image, &head, HEAD_BOX, BOX_THICKNESS);
        }

        let overlay = resize_to_width(&pick.image, head.width.max(0) as u32);
        let placed = BoundingBox::new(head.x, head.y, overlay.width() as i32, overlay.height() as i32);
        tracing::debug!(?region, ?placed, "pasting head");
        paste(image, &overlay, head.x, head.y);

        replacements.push(Replacement {
            region: *region,
            placed,
            overlay: pick.path,
            mirrored: pick.mirrored,
        });
    }
    Ok(replacements)
}
