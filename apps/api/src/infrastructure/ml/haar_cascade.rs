//! Boosted Haar cascade model and per-window evaluation.
//!
//! Reads the OpenCV cascade XML format (`opencv-cascade-classifier`, HAAR
//! features, BOOST stages) as shipped in `haarcascade_frontalface_default.xml`.
//! Upright features only; cascades that use tilted features are rejected at
//! load time.

use anyhow::{Context, anyhow, bail, ensure};
use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use roxmltree::Node;
use std::path::Path;
use std::str::FromStr;

/// Summed-area tables of pixel values and squared pixel values for one scan
/// image. Plain sums are `u32`, so the scan image must stay below 2048x2048.
pub struct ScanTables {
    sums: Image<Luma<u32>>,
    squared: Image<Luma<u64>>,
}

impl ScanTables {
    pub fn new(gray: &GrayImage) -> Self {
        Self {
            sums: integral_image::<_, u32>(gray),
            squared: integral_squared_image::<_, u64>(gray),
        }
    }

    /// Sum of pixels in a non-empty rectangle inside the image.
    pub fn sum(&self, x: u32, y: u32, width: u32, height: u32) -> u32 {
        sum_image_pixels(&self.sums, x, y, x + width - 1, y + height - 1)[0]
    }

    pub fn squared_sum(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        sum_image_pixels(&self.squared, x, y, x + width - 1, y + height - 1)[0]
    }
}

/// A rectangle of a Haar feature in base-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

/// Internal split node of a weak classifier tree.
///
/// `left`/`right` follow the OpenCV convention: a positive value is the
/// index of the next node, zero or negative is `-leaf_index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

impl WeakClassifier {
    /// Single split with two leaves.
    pub fn stump(feature: usize, threshold: f32, left: f32, right: f32) -> Self {
        Self {
            nodes: vec![TreeNode {
                left: 0,
                right: -1,
                feature,
                threshold,
            }],
            leaves: vec![left, right],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

/// Validated cascade. Immutable once built; evaluation keeps no state.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn new(
        window_width: u32,
        window_height: u32,
        stages: Vec<Stage>,
        features: Vec<HaarFeature>,
    ) -> anyhow::Result<Self> {
        ensure!(
            window_width > 2 && window_height > 2,
            "cascade window {}x{} is too small",
            window_width,
            window_height
        );
        ensure!(!stages.is_empty(), "cascade has no stages");

        for (i, feature) in features.iter().enumerate() {
            ensure!(!feature.rects.is_empty(), "feature {} has no rectangles", i);
            for rect in &feature.rects {
                ensure!(
                    rect.x + rect.width <= window_width && rect.y + rect.height <= window_height,
                    "feature {} rectangle {:?} exceeds the {}x{} window",
                    i,
                    rect,
                    window_width,
                    window_height
                );
            }
        }

        for (s, stage) in stages.iter().enumerate() {
            ensure!(!stage.classifiers.is_empty(), "stage {} has no classifiers", s);
            for (c, weak) in stage.classifiers.iter().enumerate() {
                validate_tree(weak, features.len())
                    .with_context(|| format!("stage {} classifier {}", s, c))?;
            }
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Cascade file not found at {}", path.display());
        }
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cascade file {}", path.display()))?;
        Self::from_xml_str(&xml)
            .with_context(|| format!("Invalid cascade file {}", path.display()))
    }

    pub fn from_xml_str(xml: &str) -> anyhow::Result<Self> {
        let doc = roxmltree::Document::parse(xml)?;
        let cascade = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| anyhow!("missing <cascade> element"))?;

        if let Some(feature_type) = optional_text(cascade, "featureType") {
            ensure!(
                feature_type.eq_ignore_ascii_case("HAAR"),
                "unsupported feature type {}",
                feature_type
            );
        }
        if let Some(stage_type) = optional_text(cascade, "stageType") {
            ensure!(
                stage_type.eq_ignore_ascii_case("BOOST"),
                "unsupported stage type {}",
                stage_type
            );
        }

        let width: u32 = parse_scalar(required_text(cascade, "width")?)?;
        let height: u32 = parse_scalar(required_text(cascade, "height")?)?;

        let stages = list_items(required_child(cascade, "stages")?)
            .map(parse_stage)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let features = list_items(required_child(cascade, "features")?)
            .enumerate()
            .map(|(i, node)| parse_feature(node).with_context(|| format!("feature {}", i)))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::new(width, height, stages, features)
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Cascade with every feature scaled to a window `scale` times the base size.
    pub fn scaled(&self, scale: f64) -> ScaledCascade<'_> {
        let window_width = scale_len(self.window_width, scale);
        let window_height = scale_len(self.window_height, scale);

        let features = self
            .features
            .iter()
            .map(|feature| {
                let mut rects: Vec<ScaledRect> = feature
                    .rects
                    .iter()
                    .map(|r| ScaledRect::new(r.x, r.y, r.width, r.height, r.weight, scale))
                    .map(|r| r.clamped(window_width, window_height))
                    .collect();
                // Rounding changes rectangle areas; re-balance the first
                // weight so a flat patch still sums to zero.
                let rest: f64 = rects[1..].iter().map(|r| r.weight * r.area()).sum();
                if rects.len() > 1 {
                    rects[0].weight = -rest / rects[0].area();
                }
                rects
            })
            .collect();

        let norm_rect = ScaledRect::new(
            1,
            1,
            self.window_width - 2,
            self.window_height - 2,
            1.0,
            scale,
        )
        .clamped(window_width, window_height);

        let area_ratio = f64::from(window_width) * f64::from(window_height)
            / (f64::from(self.window_width) * f64::from(self.window_height));

        ScaledCascade {
            cascade: self,
            window_width,
            window_height,
            features,
            norm_rect,
            base_norm_area: f64::from((self.window_width - 2) * (self.window_height - 2)),
            area_ratio,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScaledRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

impl ScaledRect {
    fn new(x: u32, y: u32, width: u32, height: u32, weight: f32, scale: f64) -> Self {
        Self {
            x: scale_len(x, scale),
            y: scale_len(y, scale),
            width: scale_len(width, scale).max(1),
            height: scale_len(height, scale).max(1),
            weight: f64::from(weight),
        }
    }

    fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }

    fn clamped(mut self, window_width: u32, window_height: u32) -> Self {
        self.x = self.x.min(window_width - 1);
        self.y = self.y.min(window_height - 1);
        self.width = self.width.min(window_width - self.x);
        self.height = self.height.min(window_height - self.y);
        self
    }
}

/// A cascade bound to one pyramid level.
pub struct ScaledCascade<'a> {
    cascade: &'a HaarCascade,
    window_width: u32,
    window_height: u32,
    features: Vec<Vec<ScaledRect>>,
    norm_rect: ScaledRect,
    base_norm_area: f64,
    area_ratio: f64,
}

impl ScaledCascade<'_> {
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    /// The window must lie inside the scanned image.
    pub fn accepts(&self, tables: &ScanTables, x: u32, y: u32) -> bool {
        let norm_factor = self.variance_norm_factor(tables, x, y);

        self.cascade.stages.iter().all(|stage| {
            let sum: f64 = stage
                .classifiers
                .iter()
                .map(|weak| self.evaluate_tree(weak, tables, x, y, norm_factor))
                .sum();
            sum >= f64::from(stage.threshold)
        })
    }

    fn variance_norm_factor(&self, tables: &ScanTables, x: u32, y: u32) -> f64 {
        let r = self.norm_rect;
        let area = f64::from(r.width) * f64::from(r.height);
        let sum = f64::from(tables.sum(x + r.x, y + r.y, r.width, r.height));
        let sq_sum = tables.squared_sum(x + r.x, y + r.y, r.width, r.height) as f64;
        let mean = sum / area;
        let variance = sq_sum / area - mean * mean;
        if variance > 0.0 {
            variance.sqrt() * self.base_norm_area
        } else {
            1.0
        }
    }

    fn feature_value(&self, feature: usize, tables: &ScanTables, x: u32, y: u32) -> f64 {
        let weighted: f64 = self.features[feature]
            .iter()
            .map(|r| r.weight * f64::from(tables.sum(x + r.x, y + r.y, r.width, r.height)))
            .sum();
        weighted / self.area_ratio
    }

    fn evaluate_tree(
        &self,
        weak: &WeakClassifier,
        tables: &ScanTables,
        x: u32,
        y: u32,
        norm_factor: f64,
    ) -> f64 {
        let mut index = 0usize;
        loop {
            let node = &weak.nodes[index];
            let value = self.feature_value(node.feature, tables, x, y);
            let next = if value < f64::from(node.threshold) * norm_factor {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return f64::from(weak.leaves[next.unsigned_abs() as usize]);
            }
            index = next as usize;
        }
    }
}

fn scale_len(value: u32, scale: f64) -> u32 {
    (f64::from(value) * scale).round() as u32
}

fn validate_tree(weak: &WeakClassifier, feature_count: usize) -> anyhow::Result<()> {
    ensure!(!weak.nodes.is_empty(), "weak classifier has no nodes");
    for (i, node) in weak.nodes.iter().enumerate() {
        ensure!(
            node.feature < feature_count,
            "node {} references feature {} of {}",
            i,
            node.feature,
            feature_count
        );
        for child in [node.left, node.right] {
            if child > 0 {
                // Children must point forward so evaluation always terminates.
                ensure!(
                    (child as usize) > i && (child as usize) < weak.nodes.len(),
                    "node {} has invalid child {}",
                    i,
                    child
                );
            } else {
                ensure!(
                    (child.unsigned_abs() as usize) < weak.leaves.len(),
                    "node {} references missing leaf {}",
                    i,
                    child
                );
            }
        }
    }
    Ok(())
}

// === XML parsing ===

fn list_items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element() && n.has_tag_name("_"))
}

fn required_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> anyhow::Result<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
        .ok_or_else(|| anyhow!("missing <{}> element", name))
}

fn optional_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn required_text<'a>(node: Node<'a, '_>, name: &str) -> anyhow::Result<&'a str> {
    optional_text(node, name).ok_or_else(|| anyhow!("missing text in <{}>", name))
}

fn parse_scalar<T>(text: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("invalid number {:?}: {}", text, e))
}

fn parse_numbers(text: &str) -> anyhow::Result<Vec<f64>> {
    text.split_whitespace().map(parse_scalar::<f64>).collect()
}

fn parse_stage(node: Node<'_, '_>) -> anyhow::Result<Stage> {
    let threshold: f32 = parse_scalar(required_text(node, "stageThreshold")?)?;
    let classifiers = list_items(required_child(node, "weakClassifiers")?)
        .map(parse_weak_classifier)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node<'_, '_>) -> anyhow::Result<WeakClassifier> {
    let raw_nodes = parse_numbers(required_text(node, "internalNodes")?)?;
    ensure!(
        !raw_nodes.is_empty() && raw_nodes.len() % 4 == 0,
        "internalNodes must hold groups of four values, got {}",
        raw_nodes.len()
    );

    let nodes = raw_nodes
        .chunks_exact(4)
        .map(|chunk| {
            ensure!(chunk[2] >= 0.0, "negative feature index {}", chunk[2]);
            Ok(TreeNode {
                left: chunk[0] as i32,
                right: chunk[1] as i32,
                feature: chunk[2] as usize,
                threshold: chunk[3] as f32,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let leaves = parse_numbers(required_text(node, "leafValues")?)?
        .into_iter()
        .map(|v| v as f32)
        .collect();

    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node<'_, '_>) -> anyhow::Result<HaarFeature> {
    if let Some(tilted) = optional_text(node, "tilted") {
        ensure!(tilted == "0", "tilted features are not supported");
    }

    let rects = list_items(required_child(node, "rects")?)
        .map(|rect| {
            let values = parse_numbers(rect.text().unwrap_or_default())?;
            ensure!(values.len() == 5, "rectangle needs 5 values, got {}", values.len());
            ensure!(
                values[..4].iter().all(|v| *v >= 0.0),
                "rectangle has negative geometry {:?}",
                values
            );
            Ok(WeightedRect {
                x: values[0] as u32,
                y: values[1] as u32,
                width: values[2] as u32,
                height: values[3] as u32,
                weight: values[4] as f32,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(HaarFeature { rects })
}
