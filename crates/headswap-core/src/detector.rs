//! Multi-scale Haar cascade detection.
//!
//! Scans an image pyramid with a cascade's fixed-size window, then merges
//! overlapping hits into one box per object the way OpenCV's
//! `groupRectangles` does.

use crate::cascade::{CascadeError, HaarCascade};
use crate::integral::IntegralImages;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use serde::Deserialize;
use std::borrow::Cow;
use std::path::Path;

// --- Named constants ---
const DEFAULT_SCALE_FACTOR: f64 = 1.3;
const DEFAULT_MIN_NEIGHBORS: u32 = 5;
const DEFAULT_MAX_DIMENSION: u32 = 1024;
const EYE_SCALE_FACTOR: f64 = 1.1;
const EYE_MIN_NEIGHBORS: u32 = 3;
/// Relative tolerance for two hits to count as the same object.
const GROUP_EPS: f64 = 0.2;

/// Convert to the greyscale the stock OpenCV cascades were trained on.
///
/// Uses the BT.601 weights of OpenCV's `BGR2GRAY`, not the Rec. 709 weights
/// of [`imageops::grayscale`]. Cascade thresholds sit close to the feature
/// sums they were fitted on, so the input has to match.
pub fn luma_bt601(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().min(255.0) as u8])
    })
}

/// Anything that can find regions of interest in a greyscale image.
///
/// The fallback pipeline only depends on this trait, so stages can be
/// driven by a cascade or by a fixed list of boxes in tests.
pub trait RegionDetector {
    /// Detect regions in `gray`, in its pixel coordinates.
    fn detect(&self, gray: &GrayImage) -> Vec<BoundingBox>;

    /// Detect inside `roi` only; boxes are returned in `gray`'s coordinates.
    fn detect_in(&self, gray: &GrayImage, roi: &BoundingBox) -> Vec<BoundingBox> {
        let Some(roi) = roi.clip_to(gray.width(), gray.height()) else {
            return Vec::new();
        };
        let crop = imageops::crop_imm(
            gray,
            roi.x as u32,
            roi.y as u32,
            roi.width as u32,
            roi.height as u32,
        )
        .to_image();
        self.detect(&crop)
            .into_iter()
            .map(|b| b.translated(roi.x, roi.y))
            .collect()
    }
}

/// Tuning for one cascade.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectParams {
    /// Pyramid step between scales; must be greater than 1.
    pub scale_factor: f64,
    /// Hits an object needs (exclusive) to survive grouping. 0 disables grouping.
    pub min_neighbors: u32,
    /// Smallest window side, in input pixels, worth scanning.
    pub min_size: u32,
    /// Images whose longest side exceeds this are downscaled before the
    /// scan; boxes are mapped back. 0 disables downscaling.
    pub max_dimension: u32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: 0,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl DetectParams {
    /// Defaults for the eye cascade, which runs on small face crops.
    pub fn eyes() -> Self {
        Self {
            scale_factor: EYE_SCALE_FACTOR,
            min_neighbors: EYE_MIN_NEIGHBORS,
            ..Self::default()
        }
    }
}

/// A Haar cascade paired with its detection parameters.
pub struct CascadeDetector {
    cascade: HaarCascade,
    params: DetectParams,
}

impl CascadeDetector {
    pub fn new(cascade: HaarCascade, params: DetectParams) -> Self {
        Self { cascade, params }
    }

    /// Load the cascade XML at `path`.
    pub fn load(path: impl AsRef<Path>, params: DetectParams) -> Result<Self, CascadeError> {
        Ok(Self::new(HaarCascade::load(path)?, params))
    }
}

impl RegionDetector for CascadeDetector {
    fn detect(&self, gray: &GrayImage) -> Vec<BoundingBox> {
        detect_multi_scale(&self.cascade, gray, &self.params)
    }
}

/// Run `cascade` over every pyramid level of `gray` and group the hits.
pub fn detect_multi_scale(
    cascade: &HaarCascade,
    gray: &GrayImage,
    params: &DetectParams,
) -> Vec<BoundingBox> {
    if params.scale_factor <= 1.0 {
        tracing::warn!(scale_factor = params.scale_factor, "scale factor must exceed 1; skipping detection");
        return Vec::new();
    }

    let (work, back) = fit_within(gray, params.max_dimension);
    let work: &GrayImage = &work;
    let (ww, wh) = cascade.window_size();
    let mut candidates = Vec::new();
    let mut factor = 1.0f64;

    loop {
        let sw = (work.width() as f64 / factor).round() as u32;
        let sh = (work.height() as f64 / factor).round() as u32;
        if sw < ww || sh < wh {
            break;
        }

        let win_w = (ww as f64 * factor).round() as i32;
        let win_h = (wh as f64 * factor).round() as i32;
        let min_side = (win_w.min(win_h) as f64 * back) as u32;

        if min_side >= params.min_size {
            let resized;
            let level: &GrayImage = if sw == work.width() && sh == work.height() {
                work
            } else {
                resized = imageops::resize(work, sw, sh, FilterType::Triangle);
                &resized
            };
            let ii = IntegralImages::new(level, cascade.has_tilted());
            let step = if factor > 2.0 { 1 } else { 2 };
            let before = candidates.len();

            for y in (0..=(sh - wh) as usize).step_by(step) {
                for x in (0..=(sw - ww) as usize).step_by(step) {
                    if cascade.passes_window(&ii, x, y) {
                        candidates.push(BoundingBox::new(
                            (x as f64 * factor).round() as i32,
                            (y as f64 * factor).round() as i32,
                            win_w,
                            win_h,
                        ));
                    }
                }
            }

            tracing::debug!(
                factor,
                level = ?(sw, sh),
                hits = candidates.len() - before,
                "cascade pyramid level"
            );
        }

        factor *= params.scale_factor;
    }

    let grouped = group_rectangles(candidates, params.min_neighbors, GROUP_EPS);
    if back == 1.0 {
        grouped
    } else {
        grouped.into_iter().map(|b| b.scaled(back)).collect()
    }
}

/// Downscale `gray` so its longest side is at most `max_dimension`.
///
/// Returns the working image and the factor that maps its coordinates
/// back to `gray`'s.
fn fit_within(gray: &GrayImage, max_dimension: u32) -> (Cow<'_, GrayImage>, f64) {
    let (w, h) = gray.dimensions();
    let longest = w.max(h);
    if max_dimension == 0 || longest <= max_dimension {
        return (Cow::Borrowed(gray), 1.0);
    }
    let scale = max_dimension as f64 / longest as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    tracing::debug!(from = ?(w, h), to = ?(nw, nh), "downscaling before detection");
    (
        Cow::Owned(imageops::resize(gray, nw, nh, FilterType::Triangle)),
        w as f64 / nw as f64,
    )
}

/// Whether two hits are close enough to be the same object.
fn similar(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster similar hits and average each cluster.
///
/// Clusters with `min_neighbors` or fewer members are dropped, as are
/// clusters that sit inside a stronger one. With `min_neighbors == 0` the
/// hits are returned unchanged.
pub fn group_rectangles(rects: Vec<BoundingBox>, min_neighbors: u32, eps: f64) -> Vec<BoundingBox> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects;
    }

    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                let ri = find_root(&mut parent, i);
                let rj = find_root(&mut parent, j);
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // Label clusters in order of first appearance.
    let mut label_of_root = vec![usize::MAX; n];
    let mut sums: Vec<[i64; 4]> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find_root(&mut parent, i);
        if label_of_root[root] == usize::MAX {
            label_of_root[root] = sums.len();
            sums.push([0; 4]);
            counts.push(0);
        }
        let label = label_of_root[root];
        let s = &mut sums[label];
        s[0] += r.x as i64;
        s[1] += r.y as i64;
        s[2] += r.width as i64;
        s[3] += r.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<BoundingBox> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| {
            let c = c as f64;
            BoundingBox::new(
                (s[0] as f64 / c).round() as i32,
                (s[1] as f64 / c).round() as i32,
                (s[2] as f64 / c).round() as i32,
                (s[3] as f64 / c).round() as i32,
            )
        })
        .collect();

    let mut result = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if i == j || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !nested {
            result.push(*r1);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::EDGE_CASCADE;
    use image::Rgb;

    fn make_bbox(x: i32, y: i32, w: i32, h: i32) -> BoundingBox {
        BoundingBox::new(x, y, w, h)
    }

    fn edge_detector(params: DetectParams) -> CascadeDetector {
        CascadeDetector::new(HaarCascade::from_xml(EDGE_CASCADE).unwrap(), params)
    }

    #[test]
    fn test_luma_bt601_weights() {
        let colors = [
            (Rgb([255, 0, 0]), 76),
            (Rgb([0, 255, 0]), 150),
            (Rgb([0, 0, 255]), 29),
            (Rgb([255, 255, 255]), 255),
            (Rgb([0, 0, 0]), 0),
        ];
        for (color, expected) in colors {
            let gray = luma_bt601(&RgbImage::from_pixel(2, 1, color));
            assert_eq!(gray.dimensions(), (2, 1));
            assert_eq!(gray.get_pixel(1, 0).0[0], expected, "{color:?}");
        }
        // Rec. 709 gives 54 for pure red.
        let rec709 = imageops::grayscale(&RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));
        assert_eq!(rec709.get_pixel(0, 0).0[0], 54);
    }

    #[test]
    fn test_similar_within_tolerance() {
        let a = make_bbox(100, 100, 50, 50);
        let b = make_bbox(105, 104, 50, 50);
        assert!(similar(&a, &b, GROUP_EPS));
        let c = make_bbox(120, 100, 50, 50);
        assert!(!similar(&a, &c, GROUP_EPS));
    }

    #[test]
    fn test_group_averages_cluster() {
        let rects = vec![
            make_bbox(100, 100, 50, 50),
            make_bbox(102, 100, 50, 50),
            make_bbox(98, 102, 50, 50),
            make_bbox(100, 98, 50, 50),
            make_bbox(400, 400, 20, 20),
        ];
        let grouped = group_rectangles(rects, 2, GROUP_EPS);
        // Lone hit at (400, 400) has 1 member <= 2 and is dropped.
        assert_eq!(grouped, vec![make_bbox(100, 100, 50, 50)]);
    }

    #[test]
    fn test_group_drops_weak_clusters() {
        let rects = vec![make_bbox(0, 0, 10, 10), make_bbox(1, 0, 10, 10)];
        assert!(group_rectangles(rects, 5, GROUP_EPS).is_empty());
    }

    #[test]
    fn test_group_removes_nested_cluster() {
        let mut rects = Vec::new();
        for _ in 0..8 {
            rects.push(make_bbox(0, 0, 100, 100));
        }
        for _ in 0..3 {
            rects.push(make_bbox(30, 30, 20, 20));
        }
        let grouped = group_rectangles(rects, 1, GROUP_EPS);
        assert_eq!(grouped, vec![make_bbox(0, 0, 100, 100)]);
    }

    #[test]
    fn test_group_disabled_with_zero_neighbors() {
        let rects = vec![make_bbox(0, 0, 10, 10), make_bbox(1, 0, 10, 10)];
        assert_eq!(group_rectangles(rects.clone(), 0, GROUP_EPS), rects);
    }

    #[test]
    fn test_group_empty() {
        assert!(group_rectangles(vec![], 3, GROUP_EPS).is_empty());
    }

    #[test]
    fn test_detect_uniform_image_finds_nothing() {
        let det = edge_detector(DetectParams { min_neighbors: 0, ..DetectParams::default() });
        let img = GrayImage::from_pixel(40, 40, Luma([0]));
        assert!(det.detect(&img).is_empty());
    }

    #[test]
    fn test_detect_finds_edge_at_every_scale() {
        let det = edge_detector(DetectParams { min_neighbors: 0, ..DetectParams::default() });
        let img = GrayImage::from_fn(40, 40, |_, y| if y < 20 { Luma([255]) } else { Luma([0]) });
        let hits = det.detect(&img);
        assert!(!hits.is_empty());
        for b in &hits {
            assert!(b.y <= 22 && b.bottom() >= 18, "hit {b:?} away from the edge");
        }
        // Hits at more than one pyramid level.
        assert!(hits.iter().any(|b| b.width == 6));
        assert!(hits.iter().any(|b| b.width > 6));
    }

    #[test]
    fn test_grouping_prunes_raw_hits() {
        let img = GrayImage::from_fn(40, 40, |_, y| if y < 20 { Luma([255]) } else { Luma([0]) });
        let raw = edge_detector(DetectParams { min_neighbors: 0, ..DetectParams::default() }).detect(&img);
        let grouped = edge_detector(DetectParams { min_neighbors: 1, ..DetectParams::default() }).detect(&img);
        assert!(grouped.len() < raw.len());
    }

    #[test]
    fn test_detect_maps_back_after_downscale() {
        let params = DetectParams { min_neighbors: 0, max_dimension: 40, ..DetectParams::default() };
        let det = edge_detector(params);
        let img = GrayImage::from_fn(80, 80, |_, y| if y < 40 { Luma([255]) } else { Luma([0]) });
        let hits = det.detect(&img);
        assert!(!hits.is_empty());
        for b in &hits {
            assert!(b.y <= 44 && b.bottom() >= 36, "hit {b:?} not mapped back");
        }
    }

    #[test]
    fn test_detect_respects_min_size() {
        let params = DetectParams { min_neighbors: 0, min_size: 12, ..DetectParams::default() };
        let det = edge_detector(params);
        let img = GrayImage::from_fn(40, 40, |_, y| if y < 20 { Luma([255]) } else { Luma([0]) });
        assert!(det.detect(&img).iter().all(|b| b.width >= 12));
    }

    #[test]
    fn test_detect_in_roi_offsets_boxes() {
        let det = edge_detector(DetectParams { min_neighbors: 0, ..DetectParams::default() });
        let img = GrayImage::from_fn(60, 60, |x, y| {
            if x >= 30 && y >= 30 && y < 40 { Luma([255]) } else { Luma([0]) }
        });
        let hits = det.detect_in(&img, &make_bbox(30, 30, 30, 30));
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|b| b.x >= 30 && b.y >= 30));
    }

    #[test]
    fn test_invalid_scale_factor_detects_nothing() {
        let det = edge_detector(DetectParams { scale_factor: 1.0, min_neighbors: 0, ..DetectParams::default() });
        let img = GrayImage::from_fn(40, 40, |_, y| if y < 20 { Luma([255]) } else { Luma([0]) });
        assert!(det.detect(&img).is_empty());
    }

    #[test]
    fn test_eye_params() {
        let p = DetectParams::eyes();
        assert_eq!(p.scale_factor, 1.1);
        assert_eq!(p.min_neighbors, 3);
    }
}
