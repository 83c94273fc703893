use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::GrayImage;
use roxmltree::Node;
use thiserror::Error;

use super::math::partition;

/// Subtracted from every stage threshold on load, as OpenCV does.
const STAGE_THRESHOLD_EPS: f64 = 1e-5;

/// Relative tolerance used when clustering raw window hits.
const GROUP_EPS: f64 = 0.2;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

/// Axis-aligned rectangle in `(x, y, width, height)` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Clone, Debug)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Clone, Debug)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

impl HaarFeature {
    fn evaluate(&self, ii: &IntegralImage, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight * ii.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

/// Split node of a boosted tree. Child indices `<= 0` point at leaf `-index`.
#[derive(Clone, Debug)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Clone, Debug)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Clone, Debug)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Summed-area tables of a grayscale image and of its squared pixels.
///
/// Both tables have one extra leading row and column of zeros.
pub struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sqsum: Vec<u64>,
}

impl IntegralImage {
    pub fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sqsum = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sqsum = 0u64;
            for x in 0..w {
                let v = img.get_pixel(x as u32, y as u32)[0] as u64;
                row_sum += v;
                row_sqsum += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sqsum[idx] = sqsum[idx - stride] + row_sqsum;
            }
        }

        Self { stride, sum, sqsum }
    }

    pub fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::area(&self.sum, self.stride, x, y, w, h)
    }

    pub fn sqsum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::area(&self.sqsum, self.stride, x, y, w, h)
    }

    fn area(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        (table[y1 * stride + x1] + table[y0 * stride + x0])
            - (table[y0 * stride + x1] + table[y1 * stride + x0])
    }
}

/// Boosted Haar cascade in OpenCV's `opencv-cascade-classifier` XML layout.
///
/// Only upright (non-tilted) HAAR features with BOOST stages are supported,
/// which covers the stock frontal-face cascades.
#[derive(Clone, Debug)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let xml = fs::read_to_string(path).map_err(|e| CascadeError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_xml_str(&xml)
    }

    pub fn from_xml_str(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let cascade = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| {
                CascadeError::Unsupported("no <cascade> element (old-style cascade?)".into())
            })?;

        let stage_type = child_text(cascade, "stageType")?;
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
        }
        let feature_type = child_text(cascade, "featureType")?;
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!(
                "feature type {feature_type}"
            )));
        }

        let window_width: u32 = parse_one(child_text(cascade, "width")?, "width")?;
        let window_height: u32 = parse_one(child_text(cascade, "height")?, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let features = items(child(cascade, "features")?)
            .map(|f| parse_feature(f, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = items(child(cascade, "stages")?)
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err(CascadeError::Invalid("cascade has no stages".into()));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Training window size as `(width, height)`.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// The window must lie entirely inside the image behind `ii`.
    pub fn classify(&self, ii: &IntegralImage, x: u32, y: u32) -> bool {
        let (w, h) = (self.window_width - 2, self.window_height - 2);
        let area = (w * h) as f64;
        let sum = ii.sum(x + 1, y + 1, w, h) as f64;
        let sqsum = ii.sqsum(x + 1, y + 1, w, h) as f64;
        let norm = area * sqsum - sum * sum;
        let inv_norm = if norm > 0.0 { 1.0 / norm.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut score = 0.0;
            for weak in &stage.classifiers {
                let mut idx = 0i32;
                loop {
                    let node = &weak.nodes[idx as usize];
                    let value = self.features[node.feature].evaluate(ii, x, y) * inv_norm;
                    idx = if value < node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                    if idx <= 0 {
                        break;
                    }
                }
                score += weak.leaves[(-idx) as usize];
            }
            if score < stage.threshold {
                return false;
            }
        }
        true
    }

    /// Slide the cascade over an image pyramid and group the raw hits.
    ///
    /// Windows grow by `scale_factor` per level, starting at the training
    /// size. Levels whose window is smaller than `min_size` are skipped.
    /// A group needs more than `min_neighbors` hits to be reported.
    pub fn detect_multi_scale(
        &self,
        gray: &GrayImage,
        scale_factor: f64,
        min_neighbors: usize,
        min_size: u32,
    ) -> Vec<Rect> {
        let (img_w, img_h) = gray.dimensions();
        let (win_w, win_h) = self.window_size();
        let mut hits = Vec::new();

        let mut factor = 1.0f64;
        loop {
            let window_w = (win_w as f64 * factor).round() as u32;
            let window_h = (win_h as f64 * factor).round() as u32;
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w <= win_w || scaled_h <= win_h {
                break;
            }

            if window_w >= min_size && window_h >= min_size {
                let scaled: Cow<'_, GrayImage> = if factor == 1.0 {
                    Cow::Borrowed(gray)
                } else {
                    Cow::Owned(imageops::resize(
                        gray,
                        scaled_w,
                        scaled_h,
                        FilterType::Triangle,
                    ))
                };
                let ii = IntegralImage::new(&scaled);
                let step = if factor > 2.0 { 1 } else { 2 };

                for y in (0..scaled_h - win_h).step_by(step) {
                    for x in (0..scaled_w - win_w).step_by(step) {
                        if self.classify(&ii, x, y) {
                            hits.push(Rect::new(
                                (x as f64 * factor).round() as i32,
                                (y as f64 * factor).round() as i32,
                                window_w as i32,
                                window_h as i32,
                            ));
                        }
                    }
                }
            }

            factor *= scale_factor;
        }

        log::debug!("Cascade produced {} raw hits", hits.len());
        group_rectangles(&hits, min_neighbors, GROUP_EPS)
    }
}

/// Cluster overlapping hits and average each cluster.
///
/// Clusters with `min_neighbors` members or fewer are dropped, as are
/// clusters sitting inside a clearly stronger one.
pub fn group_rectangles(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    let (classes, labels) = partition(rects, |a, b| similar(a, b, eps));

    let mut totals = vec![[0i64; 4]; classes];
    let mut counts = vec![0usize; classes];
    for (r, &label) in rects.iter().zip(&labels) {
        let t = &mut totals[label];
        t[0] += r.x as i64;
        t[1] += r.y as i64;
        t[2] += r.width as i64;
        t[3] += r.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<(Rect, usize)> = totals
        .iter()
        .zip(&counts)
        .map(|(t, &n)| {
            let s = 1.0 / n as f64;
            let avg = |v: i64| (v as f64 * s).round() as i32;
            (Rect::new(avg(t[0]), avg(t[1]), avg(t[2]), avg(t[3])), n)
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, &(r1, n1)) in averaged.iter().enumerate() {
        if n1 <= min_neighbors {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, &(r2, n2))| {
            if i == j || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.x + r1.width <= r2.x + r2.width + dx
                && r1.y + r1.height <= r2.y + r2.height + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            grouped.push(r1);
        }
    }
    grouped
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: i32, q: i32| ((p - q).abs() as f64) <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn items<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Result<Node<'a, 'i>, CascadeError> {
    items(node)
        .find(|n| n.has_tag_name(tag))
        .ok_or_else(|| CascadeError::Invalid(format!("missing <{tag}>")))
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Result<&'a str, CascadeError> {
    Ok(child(node, tag)?.text().unwrap_or("").trim())
}

fn parse_one<T: FromStr>(s: &str, what: &str) -> Result<T, CascadeError> {
    s.parse()
        .map_err(|_| CascadeError::Invalid(format!("bad {what} value '{s}'")))
}

fn parse_list<T: FromStr>(s: &str, what: &str) -> Result<Vec<T>, CascadeError> {
    s.split_whitespace().map(|v| parse_one(v, what)).collect()
}

fn parse_feature(node: Node<'_, '_>, win_w: u32, win_h: u32) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = items(node).find(|n| n.has_tag_name("tilted")) {
        if tilted.text().map(str::trim) != Some("0") {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|r| {
            let values: Vec<f64> = parse_list(r.text().unwrap_or(""), "rect")?;
            let &[x, y, w, h, weight] = values.as_slice() else {
                return Err(CascadeError::Invalid(format!(
                    "rect needs 5 values, got {}",
                    values.len()
                )));
            };
            if x < 0.0 || y < 0.0 || w < 0.0 || h < 0.0 {
                return Err(CascadeError::Invalid("negative rect geometry".into()));
            }
            let rect = WeightedRect {
                x: x as u32,
                y: y as u32,
                width: w as u32,
                height: h as u32,
                weight,
            };
            if rect.x + rect.width > win_w || rect.y + rect.height > win_h {
                return Err(CascadeError::Invalid("rect outside the window".into()));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node<'_, '_>, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f64 = parse_one(child_text(node, "stageThreshold")?, "stageThreshold")?;
    let classifiers = items(child(node, "weakClassifiers")?)
        .map(|w| parse_weak(w, feature_count))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak(node: Node<'_, '_>, feature_count: usize) -> Result<WeakClassifier, CascadeError> {
    let raw: Vec<f64> = parse_list(child_text(node, "internalNodes")?, "internalNodes")?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(CascadeError::Invalid(format!(
            "internalNodes holds {} values, expected groups of 4",
            raw.len()
        )));
    }
    let leaves: Vec<f64> = parse_list(child_text(node, "leafValues")?, "leafValues")?;

    let nodes: Vec<TreeNode> = raw
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    // Internal children must point forward so evaluation always reaches a leaf.
    let child_ok = |parent: usize, idx: i32| {
        if idx > 0 {
            let idx = idx as usize;
            idx > parent && idx < nodes.len()
        } else {
            ((-idx) as usize) < leaves.len()
        }
    };
    for (i, node) in nodes.iter().enumerate() {
        if node.feature >= feature_count {
            return Err(CascadeError::Invalid(format!(
                "feature index {} out of range",
                node.feature
            )));
        }
        if !child_ok(i, node.left) || !child_ok(i, node.right) {
            return Err(CascadeError::Invalid(format!(
                "tree node {i} has a child index out of range or pointing backwards"
            )));
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}
