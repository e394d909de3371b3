//! Summed-area tables for cascade evaluation.
//!
//! Upright sums use a `(w+1) × (h+1)` table, squared sums likewise for the
//! window variance. Tilted (45°) sums use a rotated table that is padded
//! left and right by `h + 1` columns so its recurrence never reads outside
//! the buffer.

use image::GrayImage;

/// Upright, squared and (optionally) tilted integral images of one
/// greyscale image.
pub struct IntegralImages {
    width: usize,
    height: usize,
    /// `sum[y * (w+1) + x]` = sum of pixels above and left of `(x, y)`.
    sum: Vec<i64>,
    sq_sum: Vec<f64>,
    tilted: Option<TiltedTable>,
}

struct TiltedTable {
    stride: usize,
    pad: usize,
    data: Vec<i64>,
}

impl IntegralImages {
    /// Build the tables for `image`. The tilted table is only built when
    /// `with_tilted` is set, since upright-only cascades never read it.
    pub fn new(image: &GrayImage, with_tilted: bool) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let stride = width + 1;
        let raw = image.as_raw();

        let mut sum = vec![0i64; stride * (height + 1)];
        let mut sq_sum = vec![0f64; stride * (height + 1)];

        for y in 0..height {
            let mut row_sum = 0i64;
            let mut row_sq = 0f64;
            for x in 0..width {
                let p = raw[y * width + x] as i64;
                row_sum += p;
                row_sq += (p * p) as f64;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        let tilted = with_tilted.then(|| TiltedTable::new(raw, width, height));

        Self {
            width,
            height,
            sum,
            sq_sum,
            tilted,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn has_tilted(&self) -> bool {
        self.tilted.is_some()
    }

    /// Sum of the pixels in `[x, x+w) × [y, y+h)`.
    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        let s = self.width + 1;
        self.sum[(y + h) * s + x + w] - self.sum[(y + h) * s + x] - self.sum[y * s + x + w]
            + self.sum[y * s + x]
    }

    /// Sum of squared pixels in `[x, x+w) × [y, y+h)`.
    #[inline]
    pub fn rect_sq_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.width + 1;
        self.sq_sum[(y + h) * s + x + w] - self.sq_sum[(y + h) * s + x] - self.sq_sum[y * s + x + w]
            + self.sq_sum[y * s + x]
    }

    /// Sum over a 45° rotated rectangle whose top corner is at `(x, y)`,
    /// extending `w` pixels down-right and `h` pixels down-left.
    ///
    /// Returns 0 when the tilted table was not built.
    #[inline]
    pub fn tilted_sum(&self, x: i64, y: i64, w: i64, h: i64) -> i64 {
        match &self.tilted {
            Some(t) => {
                t.at(x, y) - t.at(x - h, y + h) - t.at(x + w, y + w) + t.at(x + w - h, y + w + h)
            }
            None => 0,
        }
    }
}

impl TiltedTable {
    /// `T(X, Y)` is the sum of pixels `(x, y)` with `y < Y` and
    /// `|x - X + 1| <= Y - y - 1`: the triangle opening upward from `(X-1, Y-1)`.
    fn new(raw: &[u8], width: usize, height: usize) -> Self {
        let pad = height + 1;
        let stride = width + 1 + 2 * pad;
        let mut data = vec![0i64; stride * (height + 1)];

        let pixel = |x: i64, y: i64| -> i64 {
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                0
            } else {
                raw[y as usize * width + x as usize] as i64
            }
        };

        for row in 1..=height {
            let y = row as i64;
            for col in 0..stride {
                let x = col as i64 - pad as i64;
                let up_left = if col > 0 { data[(row - 1) * stride + col - 1] } else { 0 };
                let up_right = if col + 1 < stride { data[(row - 1) * stride + col + 1] } else { 0 };
                let up_two = if row >= 2 { data[(row - 2) * stride + col] } else { 0 };
                data[row * stride + col] =
                    up_left + up_right - up_two + pixel(x - 1, y - 1) + pixel(x - 1, y - 2);
            }
        }

        Self { stride, pad, data }
    }

    #[inline]
    fn at(&self, x: i64, y: i64) -> i64 {
        let col = x + self.pad as i64;
        if y <= 0 || col < 0 || col as usize >= self.stride {
            return 0;
        }
        if y as usize * self.stride >= self.data.len() {
            return 0;
        }
        self.data[y as usize * self.stride + col as usize]
    }
}
