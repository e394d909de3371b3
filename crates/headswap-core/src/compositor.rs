//! Region-clipped alpha compositing.
//!
//! Pastes an RGBA overlay onto a larger colour image, using the overlay's
//! alpha channel as the per-pixel blend weight. Whatever part of the
//! overlay falls outside the destination is cropped away, on all four
//! sides, so a paste can never write out of bounds.

use crate::types::BoundingBox;
use image::{ImageBuffer, Pixel, Rgb, Rgba, RgbaImage};

/// Destination pixel types with at least three colour channels.
///
/// A destination alpha channel, if present, is left untouched.
pub trait ColorPixel: Pixel<Subpixel = u8> {}

impl ColorPixel for Rgb<u8> {}
impl ColorPixel for Rgba<u8> {}

/// Alpha-blend `src` onto `dst` with its top-left corner at `(x, y)`.
///
/// Each colour channel becomes `a * src + (1 - a) * dst` with
/// `a = src_alpha / 255`, rounded to the nearest `u8`. Returns the destination
/// region that was written, or `None` when the overlay lies entirely
/// outside `dst` (or is empty), in which case nothing changes.
pub fn paste<P: ColorPixel>(
    dst: &mut ImageBuffer<P, Vec<u8>>,
    src: &RgbaImage,
    x: i32,
    y: i32,
) -> Option<BoundingBox> {
    let target = BoundingBox::new(x, y, src.width() as i32, src.height() as i32);
    let clipped = target.clip_to(dst.width(), dst.height())?;

    // Rows/columns of `src` cut off on the low side.
    let src_x0 = (clipped.x - x) as u32;
    let src_y0 = (clipped.y - y) as u32;
    let dst_x0 = clipped.x as u32;
    let dst_y0 = clipped.y as u32;

    for row in 0..clipped.height as u32 {
        for col in 0..clipped.width as u32 {
            let s = src.get_pixel(src_x0 + col, src_y0 + row);
            let alpha = s[3];
            if alpha == 0 {
                continue;
            }
            let alpha = alpha as f64 / 255.0;
            let d = dst.get_pixel_mut(dst_x0 + col, dst_y0 + row).channels_mut();
            for c in 0..3 {
                let base = d[c] as f64;
                d[c] = (base + alpha * (s[c] as f64 - base)).round() as u8;
            }
        }
    }

    Some(clipped)
}

/// Like [`paste`], but with the corners given explicitly.
///
/// `(x2 - x1, y2 - y1)` must equal the overlay's size; a mismatch is
/// logged and the overlay's own size wins.
pub fn paste_rect<P: ColorPixel>(
    dst: &mut ImageBuffer<P, Vec<u8>>,
    src: &RgbaImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
) -> Option<BoundingBox> {
    if x2 - x1 != src.width() as i32 || y2 - y1 != src.height() as i32 {
        tracing::warn!(
            rect = ?(x1, y1, x2, y2),
            overlay = ?src.dimensions(),
            "paste rectangle does not match overlay size"
        );
    }
    paste(dst, src, x1, y1)
}
