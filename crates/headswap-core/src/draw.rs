//! Debug box overlays.

use crate::types::BoundingBox;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const FACE_BOX: Rgb<u8> = Rgb([0, 0, 255]);
pub const EYE_BOX: Rgb<u8> = Rgb([0, 255, 0]);
pub const HEAD_BOX: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline width of every debug box.
pub const BOX_THICKNESS: i32 = 2;

/// Draw a hollow rectangle `thickness` pixels wide, growing inward from
/// the box edges. Parts outside the canvas are clipped.
pub fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: i32) {
    for inset in 0..thickness {
        let w = bbox.width - 2 * inset;
        let h = bbox.height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x + inset, bbox.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
