//! Haar cascade classifier loaded from OpenCV's XML format.
//!
//! Only the current `opencv-cascade-classifier` layout with a BOOST stage
//! type and HAAR features is understood. That covers the frontal face, eye
//! and cat-face cascades shipped with OpenCV.

use crate::integral::IntegralImages;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const MAX_FEATURE_RECTS: usize = 3;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0}")]
    NotFound(String),
    #[error("failed to read cascade: {0}")]
    Io(#[from] std::io::Error),
    #[error("cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("malformed cascade: {0}")]
    Malformed(String),
}

/// One weighted rectangle of a Haar-like feature, in window coordinates.
#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    weight: f64,
}

#[derive(Debug, Clone)]
struct Feature {
    rects: Vec<WeightedRect>,
    tilted: bool,
}

impl Feature {
    #[inline]
    fn calc(&self, ii: &IntegralImages, wx: usize, wy: usize) -> f64 {
        let mut value = 0.0;
        for r in &self.rects {
            let sum = if self.tilted {
                ii.tilted_sum(
                    wx as i64 + r.x as i64,
                    wy as i64 + r.y as i64,
                    r.width as i64,
                    r.height as i64,
                )
            } else {
                ii.rect_sum(
                    wx + r.x as usize,
                    wy + r.y as usize,
                    r.width as usize,
                    r.height as usize,
                )
            };
            value += r.weight * sum as f64;
        }
        value
    }
}

/// Decision-tree node. Child indices `<= 0` name leaf `-index`.
#[derive(Debug, Clone, Copy)]
struct Node {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<Node>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// A boosted cascade of Haar-feature decision trees.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<Feature>,
    has_tilted: bool,
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CascadeError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CascadeError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let cascade = Self::from_xml(&text)?;
        tracing::info!(
            path = %path.display(),
            window = ?cascade.window_size(),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            tilted = cascade.has_tilted,
            "loaded Haar cascade"
        );
        Ok(cascade)
    }

    /// Parse a cascade from OpenCV XML text.
    pub fn from_xml(text: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();

        let Some(cascade) = child(root, "cascade") else {
            let legacy = elements(root)
                .any(|n| n.attribute("type_id") == Some("opencv-haar-classifier"));
            return Err(if legacy {
                CascadeError::Unsupported("legacy opencv-haar-classifier layout".into())
            } else {
                CascadeError::Malformed("missing <cascade> element".into())
            });
        };

        let stage_type = text_of(cascade, "stageType")?;
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
        }
        let feature_type = text_of(cascade, "featureType")?;
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!("feature type {feature_type}")));
        }

        let window_width: u32 = parse_one(text_of(cascade, "width")?, "width")?;
        let window_height: u32 = parse_one(text_of(cascade, "height")?, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Malformed(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let features = parse_features(require(cascade, "features")?)?;
        let stages = parse_stages(require(cascade, "stages")?, features.len())?;
        if stages.is_empty() {
            return Err(CascadeError::Malformed("cascade has no stages".into()));
        }

        for f in features.iter().filter(|f| !f.tilted) {
            for r in &f.rects {
                if r.x < 0
                    || r.y < 0
                    || r.x + r.width > window_width as i32
                    || r.y + r.height > window_height as i32
                {
                    return Err(CascadeError::Malformed(format!(
                        "feature rect {:?} outside {window_width}x{window_height} window",
                        (r.x, r.y, r.width, r.height)
                    )));
                }
            }
        }

        let has_tilted = features.iter().any(|f| f.tilted);

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
            has_tilted,
        })
    }

    /// Base detection window `(width, height)`.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Whether any feature needs the rotated summed-area table.
    pub fn has_tilted(&self) -> bool {
        self.has_tilted
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// Feature values are divided by the window's standard deviation times
    /// its area, measured over the window minus a one-pixel border. The
    /// window is rejected at the first stage whose sum falls below the
    /// stage threshold.
    pub(crate) fn passes_window(&self, ii: &IntegralImages, x: usize, y: usize) -> bool {
        let nw = self.window_width as usize - 2;
        let nh = self.window_height as usize - 2;
        let area = (nw * nh) as f64;
        let sum = ii.rect_sum(x + 1, y + 1, nw, nh) as f64;
        let sq_sum = ii.rect_sq_sum(x + 1, y + 1, nw, nh);
        let norm = area * sq_sum - sum * sum;
        let norm = if norm > 0.0 { norm.sqrt() } else { 1.0 };
        let inv_norm = 1.0 / norm;

        for stage in &self.stages {
            let mut stage_sum = 0.0;
            for weak in &stage.classifiers {
                let mut idx = 0i32;
                loop {
                    let node = &weak.nodes[idx as usize];
                    let value = self.features[node.feature].calc(ii, x, y) * inv_norm;
                    idx = if value < node.threshold { node.left } else { node.right };
                    if idx <= 0 {
                        stage_sum += weak.leaves[(-idx) as usize];
                        break;
                    }
                }
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }
}

fn parse_features(node: roxmltree::Node<'_, '_>) -> Result<Vec<Feature>, CascadeError> {
    let mut features = Vec::new();
    for (i, f) in elements(node).enumerate() {
        let rects_node = child(f, "rects")
            .ok_or_else(|| CascadeError::Malformed(format!("feature {i} has no <rects>")))?;
        let mut rects = Vec::new();
        for r in elements(rects_node) {
            let values: Vec<f64> = parse_list(r.text().unwrap_or(""), "feature rect")?;
            if values.len() != 5 {
                return Err(CascadeError::Malformed(format!(
                    "feature {i}: rect needs 5 values, got {}",
                    values.len()
                )));
            }
            rects.push(WeightedRect {
                x: values[0] as i32,
                y: values[1] as i32,
                width: values[2] as i32,
                height: values[3] as i32,
                weight: values[4],
            });
        }
        if rects.is_empty() || rects.len() > MAX_FEATURE_RECTS {
            return Err(CascadeError::Malformed(format!(
                "feature {i}: expected 1..={MAX_FEATURE_RECTS} rects, got {}",
                rects.len()
            )));
        }
        let tilted = match child(f, "tilted") {
            Some(t) => t.text().map(str::trim).unwrap_or("0") != "0",
            None => false,
        };
        features.push(Feature { rects, tilted });
    }
    if features.is_empty() {
        return Err(CascadeError::Malformed("cascade has no features".into()));
    }
    Ok(features)
}

fn parse_stages(
    node: roxmltree::Node<'_, '_>,
    feature_count: usize,
) -> Result<Vec<Stage>, CascadeError> {
    let mut stages = Vec::new();
    for (si, s) in elements(node).enumerate() {
        let threshold: f64 = parse_one(text_of(s, "stageThreshold")?, "stageThreshold")?;
        let mut classifiers = Vec::new();
        for w in elements(require(s, "weakClassifiers")?) {
            let raw: Vec<f64> = parse_list(text_of(w, "internalNodes")?, "internalNodes")?;
            let leaves: Vec<f64> = parse_list(text_of(w, "leafValues")?, "leafValues")?;
            if raw.is_empty() || raw.len() % 4 != 0 {
                return Err(CascadeError::Malformed(format!(
                    "stage {si}: internalNodes must be groups of 4, got {} values",
                    raw.len()
                )));
            }
            let nodes: Vec<Node> = raw
                .chunks_exact(4)
                .map(|c| Node {
                    left: c[0] as i32,
                    right: c[1] as i32,
                    feature: c[2] as usize,
                    threshold: c[3],
                })
                .collect();
            if leaves.len() != nodes.len() + 1 {
                return Err(CascadeError::Malformed(format!(
                    "stage {si}: {} nodes need {} leaves, got {}",
                    nodes.len(),
                    nodes.len() + 1,
                    leaves.len()
                )));
            }
            for n in &nodes {
                let child_ok = |c: i32| {
                    if c > 0 {
                        (c as usize) < nodes.len()
                    } else {
                        ((-c) as usize) < leaves.len()
                    }
                };
                if n.feature >= feature_count || !child_ok(n.left) || !child_ok(n.right) {
                    return Err(CascadeError::Malformed(format!(
                        "stage {si}: node references out of range ({n:?})"
                    )));
                }
            }
            classifiers.push(WeakClassifier { nodes, leaves });
        }
        stages.push(Stage {
            threshold,
            classifiers,
        });
    }
    Ok(stages)
}

fn elements<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> impl Iterator<Item = roxmltree::Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    elements(node).find(|n| n.has_tag_name(name))
}

fn require<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Result<roxmltree::Node<'a, 'input>, CascadeError> {
    child(node, name).ok_or_else(|| CascadeError::Malformed(format!("missing <{name}>")))
}

fn text_of<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Result<&'a str, CascadeError> {
    Ok(require(node, name)?.text().unwrap_or("").trim())
}

fn parse_one<T: FromStr>(text: &str, what: &str) -> Result<T, CascadeError> {
    text.trim()
        .parse()
        .map_err(|_| CascadeError::Malformed(format!("bad {what} value {text:?}")))
}

fn parse_list<T: FromStr>(text: &str, what: &str) -> Result<Vec<T>, CascadeError> {
    text.split_whitespace().map(|t| parse_one(t, what)).collect()
}
