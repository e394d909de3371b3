//! Aspect-preserving overlay resizing.

use image::imageops::{self, FilterType};
use image::RgbaImage;

const OVERLAY_FILTER: FilterType = FilterType::Triangle;

/// Scale `image` to exactly `width` pixels wide, keeping its aspect ratio.
///
/// The new height is truncated, but never below one pixel. A zero width
/// yields an empty image.
pub fn resize_to_width(image: &RgbaImage, width: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if width == 0 || w == 0 || h == 0 {
        return RgbaImage::new(0, 0);
    }
    if width == w {
        return image.clone();
    }
    let height = ((h as f64 * width as f64 / w as f64) as u32).max(1);
    imageops::resize(image, width, height, OVERLAY_FILTER)
}

/// Scale `image` to exactly `height` pixels tall, keeping its aspect ratio.
pub fn resize_to_height(image: &RgbaImage, height: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    if height == 0 || w == 0 || h == 0 {
        return RgbaImage::new(0, 0);
    }
    if height == h {
        return image.clone();
    }
    let width = ((w as f64 * height as f64 / h as f64) as u32).max(1);
    imageops::resize(image, width, height, OVERLAY_FILTER)
}
