use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates.
///
/// Coordinates are signed: an enlarged head box may start left of or above
/// the image and must be clipped before it is used to index pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Intersect with the `width` × `height` canvas anchored at the origin.
    ///
    /// Returns `None` when nothing of the box lies inside the canvas.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(width as i32);
        let y2 = self.bottom().min(height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Scale every coordinate by `factor`, rounding to the nearest pixel.
    pub fn scaled(&self, factor: f64) -> BoundingBox {
        BoundingBox::new(
            (self.x as f64 * factor).round() as i32,
            (self.y as f64 * factor).round() as i32,
            (self.width as f64 * factor).round() as i32,
            (self.height as f64 * factor).round() as i32,
        )
    }

    /// Shift by `(dx, dy)`.
    pub fn translated(&self, dx: i32, dy: i32) -> BoundingBox {
        BoundingBox::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Which fallback stage produced the output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceMode {
    Face,
    Cat,
    Photobomb,
}

impl std::fmt::Display for ReplaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReplaceMode::Face => "face",
            ReplaceMode::Cat => "cat",
            ReplaceMode::Photobomb => "photobomb",
        };
        f.write_str(name)
    }
}
