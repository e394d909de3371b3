//! Body placement for the photobomb fallback.

use crate::compositor::{paste_rect, ColorPixel};
use crate::resize::{resize_to_height, resize_to_width};
use crate::types::BoundingBox;
use image::{ImageBuffer, RgbaImage};
use rand::Rng;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhotobombParams {
    /// Body width as a fraction of the canvas width.
    pub width_fraction: f64,
    /// Height cap, as a fraction of the canvas height, applied when the
    /// width-scaled body would not fit vertically.
    pub max_height_fraction: f64,
}

impl Default for PhotobombParams {
    fn default() -> Self {
        Self {
            width_fraction: 0.5,
            max_height_fraction: 0.8,
        }
    }
}

/// Scale `body` for a `width × height` canvas and choose where it goes.
///
/// The body is bottom aligned and lies fully inside the canvas. It is at
/// least one pixel wide and tall, however small the canvas. Returns `None`
/// only for an empty canvas or an empty body.
pub fn place_body<R: Rng + ?Sized>(
    body: &RgbaImage,
    width: u32,
    height: u32,
    params: &PhotobombParams,
    rng: &mut R,
) -> Option<(RgbaImage, BoundingBox)> {
    if width == 0 || height == 0 {
        return None;
    }
    let target_w = ((width as f64 * params.width_fraction) as u32).max(1);
    let mut scaled = resize_to_width(body, target_w);
    if scaled.height() > height {
        let target_h = ((height as f64 * params.max_height_fraction) as u32).max(1);
        scaled = resize_to_height(body, target_h);
    }

    let (w, h) = scaled.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let x = rng.gen_range(0..=width.saturating_sub(w)) as i32;
    let y = height as i32 - h as i32;
    Some((scaled, BoundingBox::new(x, y, w as i32, h as i32)))
}

/// Paste `body` somewhere along the bottom edge of `canvas`.
///
/// Returns the box the body was placed at, or `None` if nothing was drawn.
pub fn photobomb<P: ColorPixel, R: Rng + ?Sized>(
    canvas: &mut ImageBuffer<P, Vec<u8>>,
    body: &RgbaImage,
    params: &PhotobombParams,
    rng: &mut R,
) -> Option<BoundingBox> {
    let (width, height) = canvas.dimensions();
    let Some((scaled, placed)) = place_body(body, width, height, params, rng) else {
        tracing::warn!(canvas = ?(width, height), "nothing to photobomb with");
        return None;
    };

    tracing::info!(
        x = placed.x,
        y = placed.y,
        width = placed.width,
        height = placed.height,
        "photobombing"
    );
    paste_rect(canvas, &scaled, placed.x, placed.y, placed.right(), placed.bottom());
    Some(placed)
}
