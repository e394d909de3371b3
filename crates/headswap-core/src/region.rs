//! Face-to-head box heuristic.
//!
//! Cascades find faces, but the overlays are whole heads. The box is grown
//! and shifted up and left so the pasted head covers hair and ears too.

use crate::types::BoundingBox;

/// Fraction of the face width added on the left.
const HEAD_WIDTH_GROWTH: f64 = 0.08;

/// Fraction of the face height added above the face.
const HEAD_HEIGHT_GROWTH: f64 = 0.30;

/// Enlarge a detected face box into the box the head overlay should cover.
///
/// The growth amounts are truncated to whole pixels. The result may extend
/// past the image; the compositor clips it.
pub fn head_box(face: &BoundingBox) -> BoundingBox {
    let dw = (face.width as f64 * HEAD_WIDTH_GROWTH) as i32;
    let dh = (face.height as f64 * HEAD_HEIGHT_GROWTH) as i32;
    BoundingBox::new(face.x - dw, face.y - dh, face.width + dw, face.height + dh)
}
