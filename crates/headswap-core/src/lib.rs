//! headswap-core: face detection and head replacement engine.
//!
//! Finds faces (or cat faces) with Haar cascades, pastes random head
//! overlays over them, and falls back to photobombing the picture with a
//! random body when nothing is found.

pub mod cascade;
pub mod compositor;
pub mod detector;
pub mod draw;
pub mod integral;
pub mod overlay;
pub mod photobomb;
pub mod pipeline;
pub mod region;
pub mod resize;
pub mod types;

pub use cascade::{CascadeError, HaarCascade};
pub use detector::{CascadeDetector, DetectParams, RegionDetector};
pub use overlay::{OverlayError, OverlaySet};
pub use photobomb::PhotobombParams;
pub use pipeline::{Detectors, LazyDetector, Outcome, PipelineError, PipelineOptions, Replacement};
pub use types::{BoundingBox, ReplaceMode};
