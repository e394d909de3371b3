use headswap_core::draw::{EYE_BOX, FACE_BOX, HEAD_BOX};
use headswap_core::pipeline::{self, Detectors, LazyDetector, PipelineError, PipelineOptions};
use headswap_core::{BoundingBox, OverlayError, RegionDetector, ReplaceMode};
use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::Cell;
use std::path::Path;

const BACKGROUND: Rgb<u8> = Rgb([50, 60, 70]);

struct Fixed(Vec<BoundingBox>);

impl RegionDetector for Fixed {
    fn detect(&self, _gray: &GrayImage) -> Vec<BoundingBox> {
        self.0.clone()
    }
}

/// A detector stage that records whether it was ever built.
fn counted<'a>(calls: &'a Cell<u32>, boxes: Vec<BoundingBox>) -> LazyDetector<'a> {
    LazyDetector::new(move || {
        calls.set(calls.get() + 1);
        Ok(Box::new(Fixed(boxes)) as Box<dyn RegionDetector>)
    })
}

/// Remembers the top-left grey level of every image it is asked to scan.
struct Sampling<'a>(&'a Cell<Option<u8>>);

impl RegionDetector for Sampling<'_> {
    fn detect(&self, gray: &GrayImage) -> Vec<BoundingBox> {
        self.0.set(Some(gray.get_pixel(0, 0).0[0]));
        Vec::new()
    }
}

fn write_overlay(path: &Path, w: u32, h: u32, color: Rgba<u8>) {
    RgbaImage::from_pixel(w, h, color).save(path).unwrap();
}

fn path_arg(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

#[test]
fn test_single_face_changes_only_head_box() {
    let dir = tempfile::tempdir().unwrap();
    let face_file = dir.path().join("head.png");
    write_overlay(&face_file, 54, 65, Rgba([255, 0, 0, 255]));

    let input = RgbImage::from_pixel(100, 100, BACKGROUND);
    let cat_calls = Cell::new(0);
    let mut detectors = Detectors {
        face: LazyDetector::ready(Fixed(vec![BoundingBox::new(20, 30, 50, 50)])),
        cat: counted(&cat_calls, vec![]),
        eyes: None,
    };
    let mut rng = StdRng::seed_from_u64(11);

    let outcome = pipeline::run(
        input,
        &path_arg(&face_file),
        "/nonexistent/bodies/*.png",
        &mut detectors,
        &PipelineOptions::default(),
        &mut rng,
    )
    .unwrap();

    assert_eq!(outcome.mode, ReplaceMode::Face);
    assert_eq!(cat_calls.get(), 0);
    assert_eq!(outcome.replacements.len(), 1);
    let head = BoundingBox::new(16, 15, 54, 65);
    assert_eq!(outcome.replacements[0].placed, head);

    for (x, y, p) in outcome.image.enumerate_pixels() {
        let inside = (x as i32) >= head.x
            && (x as i32) < head.right()
            && (y as i32) >= head.y
            && (y as i32) < head.bottom();
        let expected = if inside { Rgb([255, 0, 0]) } else { BACKGROUND };
        assert_eq!(*p, expected, "pixel {x},{y}");
    }
}

#[test]
fn test_head_box_past_edge_is_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let face_file = dir.path().join("head.png");
    write_overlay(&face_file, 20, 20, Rgba([0, 255, 0, 255]));

    let input = RgbImage::from_pixel(40, 40, BACKGROUND);
    let mut detectors = Detectors {
        face: LazyDetector::ready(Fixed(vec![BoundingBox::new(0, 0, 30, 30)])),
        cat: LazyDetector::ready(Fixed(vec![])),
        eyes: None,
    };
    let mut rng = StdRng::seed_from_u64(1);

    let outcome = pipeline::run(
        input,
        &path_arg(&face_file),
        "unused",
        &mut detectors,
        &PipelineOptions::default(),
        &mut rng,
    )
    .unwrap();

    // Head box is (-2, -9, 32, 39); the overlay is resized to 32x32.
    let placed = outcome.replacements[0].placed;
    assert_eq!(placed, BoundingBox::new(-2, -9, 32, 32));
    assert_eq!(outcome.image.dimensions(), (40, 40));
    assert_eq!(*outcome.image.get_pixel(0, 0), Rgb([0, 255, 0]));
    assert_eq!(*outcome.image.get_pixel(29, 22), Rgb([0, 255, 0]));
    assert_eq!(*outcome.image.get_pixel(30, 0), BACKGROUND);
    assert_eq!(*outcome.image.get_pixel(0, 23), BACKGROUND);
}

#[test]
fn test_cat_stage_runs_when_no_faces() {
    let dir = tempfile::tempdir().unwrap();
    let face_file = dir.path().join("head.png");
    write_overlay(&face_file, 10, 10, Rgba([1, 2, 3, 255]));

    let cat_calls = Cell::new(0);
    let mut detectors = Detectors {
        face: LazyDetector::ready(Fixed(vec![])),
        cat: counted(&cat_calls, vec![BoundingBox::new(10, 10, 20, 20)]),
        eyes: None,
    };
    let mut rng = StdRng::seed_from_u64(2);

    let outcome = pipeline::run(
        RgbImage::from_pixel(60, 60, BACKGROUND),
        &path_arg(&face_file),
        "unused",
        &mut detectors,
        &PipelineOptions::default(),
        &mut rng,
    )
    .unwrap();

    assert_eq!(cat_calls.get(), 1);
    assert_eq!(outcome.mode, ReplaceMode::Cat);
    assert_eq!(outcome.replacements.len(), 1);
}

#[test]
fn test_no_faces_no_cats_photobombs_once() {
    let dir = tempfile::tempdir().unwrap();
    let faces = dir.path().join("faces");
    let bodies = dir.path().join("bodies");
    std::fs::create_dir(&faces).unwrap();
    std::fs::create_dir(&bodies).unwrap();
    write_overlay(&faces.join("head.png"), 10, 10, Rgba([1, 2, 3, 255]));
    write_overlay(&bodies.join("body.png"), 10, 20, Rgba([255, 255, 255, 255]));

    let input = RgbImage::from_pixel(100, 80, Rgb([0, 0, 0]));
    let mut detectors = Detectors {
        face: LazyDetector::ready(Fixed(vec![])),
        cat: LazyDetector::ready(Fixed(vec![])),
        eyes: None,
    };
    let mut rng = StdRng::seed_from_u64(3);

    let outcome = pipeline::run(
        input,
        &path_arg(&faces),
        &path_arg(&bodies),
        &mut detectors,
        &PipelineOptions::default(),
        &mut rng,
    )
    .unwrap();

    assert_eq!(outcome.mode, ReplaceMode::Photobomb);
    assert_eq!(outcome.replacements.len(), 1);

    // Half width (50x100) is too tall for 80 rows; capped to 64 tall, 32 wide.
    let placed = outcome.replacements[0].placed;
    assert_eq!((placed.width, placed.height), (32, 64));
    assert_eq!(placed.bottom(), 80);
    assert!(placed.x >= 0 && placed.right() <= 100);

    let changed: Vec<(u32, u32)> = outcome
        .image
        .enumerate_pixels()
        .filter(|(_, _, p)| **p != Rgb([0, 0, 0]))
        .map(|(x, y, _)| (x, y))
        .collect();
    assert_eq!(changed.len(), 32 * 64);
    assert!(changed.iter().all(|&(_, y)| y >= 16));
}

#[test]
fn test_detectors_see_bt601_grey() {
    let dir = tempfile::tempdir().unwrap();
    write_overlay(&dir.path().join("head.png"), 4, 4, Rgba([1, 2, 3, 255]));
    write_overlay(&dir.path().join("body.png"), 4, 4, Rgba([1, 2, 3, 255]));

    let face_sample = Cell::new(None);
    let cat_sample = Cell::new(None);
    let mut detectors = Detectors {
        face: LazyDetector::ready(Sampling(&face_sample)),
        cat: LazyDetector::ready(Sampling(&cat_sample)),
        eyes: None,
    };
    let mut rng = StdRng::seed_from_u64(8);

    pipeline::run(
        RgbImage::from_pixel(30, 30, Rgb([255, 0, 0])),
        &path_arg(&dir.path().join("head.png")),
        &path_arg(&dir.path().join("body.png")),
        &mut detectors,
        &PipelineOptions::default(),
        &mut rng,
    )
    .unwrap();

    assert_eq!(face_sample.get(), Some(76));
    assert_eq!(cat_sample.get(), Some(76));
}

#[test]
fn test_forced_photobomb_skips_detectors() {
    let dir = tempfile::tempdir().unwrap();
    let body = dir.path().join("body.png");
    write_overlay(&body, 10, 10, Rgba([200, 0, 0, 255]));

    let face_calls = Cell::new(0);
    let cat_calls = Cell::new(0);
    let mut detectors = Detectors {
        face: counted(&face_calls, vec![BoundingBox::new(0, 0, 5, 5)]),
        cat: counted(&cat_calls, vec![BoundingBox::new(0, 0, 5, 5)]),
        eyes: None,
    };
    let options = PipelineOptions {
        force_photobomb: true,
        ..PipelineOptions::default()
    };
    let mut rng = StdRng::seed_from_u64(4);

    let outcome = pipeline::run(
        RgbImage::new(40, 40),
        "/nonexistent/faces/*.png",
        &path_arg(&body),
        &mut detectors,
        &options,
        &mut rng,
    )
    .unwrap();

    assert_eq!(outcome.mode, ReplaceMode::Photobomb);
    assert_eq!(face_calls.get(), 0);
    assert_eq!(cat_calls.get(), 0);
}

#[test]
fn test_same_seed_same_output() {
    let dir = tempfile::tempdir().unwrap();
    for (i, color) in [[255, 0, 0], [0, 255, 0], [0, 0, 255]].iter().enumerate() {
        // Left half opaque, right half translucent, so mirroring is visible.
        let img = RgbaImage::from_fn(12, 12, |x, _| {
            let a = if x < 6 { 255 } else { 90 };
            Rgba([color[0], color[1], color[2], a])
        });
        img.save(dir.path().join(format!("h{i}.png"))).unwrap();
    }
    let regions = vec![BoundingBox::new(5, 10, 20, 20), BoundingBox::new(40, 12, 24, 24)];

    let run = |seed: u64| {
        let mut detectors = Detectors {
            face: LazyDetector::ready(Fixed(regions.clone())),
            cat: LazyDetector::ready(Fixed(vec![])),
            eyes: None,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        pipeline::run(
            RgbImage::from_pixel(80, 60, BACKGROUND),
            &path_arg(dir.path()),
            "unused",
            &mut detectors,
            &PipelineOptions::default(),
            &mut rng,
        )
        .unwrap()
    };

    let a = run(99);
    let b = run(99);
    assert_eq!(a.image.as_raw(), b.image.as_raw());
    assert_eq!(a.replacements, b.replacements);
}

#[test]
fn test_empty_face_set_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut detectors = Detectors {
        face: LazyDetector::ready(Fixed(vec![BoundingBox::new(0, 0, 5, 5)])),
        cat: LazyDetector::ready(Fixed(vec![])),
        eyes: None,
    };
    let mut rng = StdRng::seed_from_u64(5);

    let err = pipeline::run(
        RgbImage::new(20, 20),
        &path_arg(dir.path()),
        "unused",
        &mut detectors,
        &PipelineOptions::default(),
        &mut rng,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Overlay(OverlayError::EmptyOverlaySet(_))));
}

#[test]
fn test_debug_boxes_drawn() {
    let dir = tempfile::tempdir().unwrap();
    let face_file = dir.path().join("clear.png");
    write_overlay(&face_file, 10, 10, Rgba([0, 0, 0, 0]));

    let mut detectors = Detectors {
        face: LazyDetector::ready(Fixed(vec![BoundingBox::new(20, 30, 50, 50)])),
        cat: LazyDetector::ready(Fixed(vec![])),
        // Eye boxes are reported relative to the face crop.
        eyes: Some(LazyDetector::ready(Fixed(vec![BoundingBox::new(5, 5, 10, 10)]))),
    };
    let options = PipelineOptions {
        draw_boxes: true,
        ..PipelineOptions::default()
    };
    let mut rng = StdRng::seed_from_u64(6);

    let outcome = pipeline::run(
        RgbImage::from_pixel(100, 100, BACKGROUND),
        &path_arg(&face_file),
        "unused",
        &mut detectors,
        &options,
        &mut rng,
    )
    .unwrap();

    assert_eq!(*outcome.image.get_pixel(20, 30), FACE_BOX);
    assert_eq!(*outcome.image.get_pixel(25, 35), EYE_BOX);
    assert_eq!(*outcome.image.get_pixel(16, 15), HEAD_BOX);
    assert_eq!(*outcome.image.get_pixel(45, 55), BACKGROUND);
}
