//! Boosted Haar cascade model, as written by OpenCV's cascade trainers.
//!
//! Two XML layouts are accepted:
//! - the current `opencv-cascade-classifier` layout (shared `<features>`
//!   table, `<internalNodes>`/`<leafValues>` weak classifiers)
//! - the legacy `opencv-haar-classifier` layout (features inlined in each
//!   tree node, `<left_val>`/`<left_node>` children), which is what most
//!   published vehicle cascades such as `cars.xml` use.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use roxmltree::{Document, Node};

use crate::detect::integral::IntegralImages;

/// One weighted rectangle of a Haar feature, in window coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
    /// 45-degree rotated rectangles.
    pub tilted: bool,
}

impl HaarFeature {
    fn value(&self, integral: &IntegralImages, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| {
                let sum = if self.tilted {
                    integral.tilted_sum(x + r.x, y + r.y, r.width, r.height)
                } else {
                    integral.sum(x + r.x, y + r.y, r.width, r.height)
                };
                r.weight * sum as f64
            })
            .sum()
    }

    fn check_bounds(&self, window: (u32, u32)) -> Result<()> {
        for r in &self.rects {
            let fits = if self.tilted {
                r.x >= r.height
                    && r.x + r.width <= window.0
                    && r.y + r.width + r.height <= window.1
            } else {
                r.x + r.width <= window.0 && r.y + r.height <= window.1
            };
            if !fits {
                return Err(anyhow!(
                    "feature rect {:?} (tilted={}) exceeds {}x{} window",
                    r,
                    self.tilted,
                    window.0,
                    window.1
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Branch {
    Node(usize),
    Leaf(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f64,
    pub left: Branch,
    pub right: Branch,
}

/// Weak classifier. Evaluation starts at `nodes[0]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub trees: Vec<DecisionTree>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CascadeModel {
    window: (u32, u32),
    features: Vec<HaarFeature>,
    stages: Vec<Stage>,
}

impl CascadeModel {
    pub fn new(
        window: (u32, u32),
        features: Vec<HaarFeature>,
        stages: Vec<Stage>,
    ) -> Result<Self> {
        if window.0 < 3 || window.1 < 3 {
            return Err(anyhow!(
                "cascade window {}x{} is too small",
                window.0,
                window.1
            ));
        }
        if stages.is_empty() {
            return Err(anyhow!("cascade has no stages"));
        }
        for feature in &features {
            feature.check_bounds(window)?;
        }
        for (stage_idx, stage) in stages.iter().enumerate() {
            for tree in &stage.trees {
                if tree.nodes.is_empty() {
                    return Err(anyhow!("stage {} has an empty tree", stage_idx));
                }
                for (node_idx, node) in tree.nodes.iter().enumerate() {
                    if node.feature >= features.len() {
                        return Err(anyhow!(
                            "stage {} references unknown feature {}",
                            stage_idx,
                            node.feature
                        ));
                    }
                    for branch in [node.left, node.right] {
                        if let Branch::Node(next) = branch {
                            // Children always follow their parent, which rules out cycles.
                            if next <= node_idx || next >= tree.nodes.len() {
                                return Err(anyhow!(
                                    "stage {} has a dangling tree node {}",
                                    stage_idx,
                                    next
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(Self {
            window,
            features,
            stages,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cascade model {}", path.display()))?;
        Self::from_xml(&xml)
            .with_context(|| format!("failed to load cascade model {}", path.display()))
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml).context("cascade is not well-formed XML")?;
        let storage = doc.root_element();
        let classifier = storage
            .children()
            .filter(Node::is_element)
            .find(|n| {
                matches!(
                    n.attribute("type_id"),
                    Some("opencv-cascade-classifier") | Some("opencv-haar-classifier")
                )
            })
            .or_else(|| storage.children().find(Node::is_element))
            .ok_or_else(|| anyhow!("cascade file has no classifier element"))?;

        if child(classifier, "size").is_some() {
            parse_legacy(classifier)
        } else {
            parse_current(classifier)
        }
    }

    pub fn window(&self) -> (u32, u32) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn has_tilted_features(&self) -> bool {
        self.features.iter().any(|f| f.tilted)
    }

    /// Run every stage on the window whose top-left corner is `(x, y)`.
    pub fn accepts(&self, integral: &IntegralImages, x: u32, y: u32) -> bool {
        let (win_w, win_h) = self.window;
        let (nx, ny, nw, nh) = (x + 1, y + 1, win_w - 2, win_h - 2);
        let area = (nw * nh) as f64;
        let sum = integral.sum(nx, ny, nw, nh) as f64;
        let sq_sum = integral.sq_sum(nx, ny, nw, nh) as f64;
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        for stage in &self.stages {
            let mut score = 0.0;
            for tree in &stage.trees {
                score += self.eval_tree(tree, integral, x, y, norm);
            }
            if score < stage.threshold {
                return false;
            }
        }
        true
    }

    fn eval_tree(
        &self,
        tree: &DecisionTree,
        integral: &IntegralImages,
        x: u32,
        y: u32,
        norm: f64,
    ) -> f64 {
        let mut node = &tree.nodes[0];
        loop {
            let value = self.features[node.feature].value(integral, x, y) / norm;
            let branch = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            match branch {
                Branch::Leaf(leaf) => return leaf,
                Branch::Node(next) => node = &tree.nodes[next],
            }
        }
    }
}

// -------------------- current layout --------------------

fn parse_current(cascade: Node) -> Result<CascadeModel> {
    if let Some(kind) = child(cascade, "featureType") {
        let kind = text(kind);
        if !kind.trim().eq_ignore_ascii_case("HAAR") {
            return Err(anyhow!("unsupported cascade feature type '{}'", kind.trim()));
        }
    }
    let width = parse_scalar::<u32>(required(cascade, "width")?)?;
    let height = parse_scalar::<u32>(required(cascade, "height")?)?;

    let features = items(required(cascade, "features")?)
        .map(parse_feature)
        .collect::<Result<Vec<_>>>()?;

    let mut stages = Vec::new();
    for stage in items(required(cascade, "stages")?) {
        let threshold = parse_scalar::<f64>(required(stage, "stageThreshold")?)?;
        let mut trees = Vec::new();
        for weak in items(required(stage, "weakClassifiers")?) {
            trees.push(parse_weak_classifier(weak)?);
        }
        stages.push(Stage { threshold, trees });
    }

    CascadeModel::new((width, height), features, stages)
}

/// `<internalNodes>` holds `left right feature threshold` quadruples. A child
/// greater than zero is a node index; otherwise `-child` indexes `<leafValues>`.
fn parse_weak_classifier(weak: Node) -> Result<DecisionTree> {
    let raw_nodes = numbers::<f64>(required(weak, "internalNodes")?)?;
    let leaves = numbers::<f64>(required(weak, "leafValues")?)?;
    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(anyhow!(
            "internalNodes must hold groups of 4 values, got {}",
            raw_nodes.len()
        ));
    }
    let branch = |raw: f64| -> Result<Branch> {
        let idx = raw as i64;
        if idx > 0 {
            Ok(Branch::Node(idx as usize))
        } else {
            leaves
                .get((-idx) as usize)
                .copied()
                .map(Branch::Leaf)
                .ok_or_else(|| anyhow!("leaf index {} out of range", -idx))
        }
    };
    let nodes = raw_nodes
        .chunks_exact(4)
        .map(|q| {
            Ok(TreeNode {
                left: branch(q[0])?,
                right: branch(q[1])?,
                feature: q[2] as usize,
                threshold: q[3],
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(DecisionTree { nodes })
}

// -------------------- legacy layout --------------------

fn parse_legacy(classifier: Node) -> Result<CascadeModel> {
    let size = numbers::<u32>(required(classifier, "size")?)?;
    let [width, height] = size[..] else {
        return Err(anyhow!("legacy cascade <size> must hold two values"));
    };

    let mut features = Vec::new();
    let mut stages = Vec::new();
    for stage in items(required(classifier, "stages")?) {
        let threshold = parse_scalar::<f64>(required(stage, "stage_threshold")?)?;
        let mut trees = Vec::new();
        for tree in items(required(stage, "trees")?) {
            let mut nodes = Vec::new();
            for node in items(tree) {
                features.push(parse_feature(required(node, "feature")?)?);
                nodes.push(TreeNode {
                    feature: features.len() - 1,
                    threshold: parse_scalar::<f64>(required(node, "threshold")?)?,
                    left: legacy_branch(node, "left_val", "left_node")?,
                    right: legacy_branch(node, "right_val", "right_node")?,
                });
            }
            trees.push(DecisionTree { nodes });
        }
        stages.push(Stage { threshold, trees });
    }

    CascadeModel::new((width, height), features, stages)
}

fn legacy_branch(node: Node, val_tag: &str, node_tag: &str) -> Result<Branch> {
    if let Some(val) = child(node, val_tag) {
        return Ok(Branch::Leaf(parse_scalar::<f64>(val)?));
    }
    if let Some(next) = child(node, node_tag) {
        return Ok(Branch::Node(parse_scalar::<usize>(next)?));
    }
    Err(anyhow!("tree node has neither <{}> nor <{}>", val_tag, node_tag))
}

// -------------------- shared helpers --------------------

fn parse_feature(feature: Node) -> Result<HaarFeature> {
    let mut rects = Vec::new();
    for rect in items(required(feature, "rects")?) {
        let values = numbers::<f64>(rect)?;
        let [x, y, w, h, weight] = values[..] else {
            return Err(anyhow!(
                "feature rect must hold 5 values, got {}",
                values.len()
            ));
        };
        if x < 0.0 || y < 0.0 || w <= 0.0 || h <= 0.0 {
            return Err(anyhow!("feature rect has negative or empty geometry"));
        }
        rects.push(WeightedRect {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
            weight,
        });
    }
    if rects.is_empty() {
        return Err(anyhow!("feature has no rects"));
    }
    let tilted = match child(feature, "tilted") {
        Some(t) => parse_scalar::<u32>(t)? != 0,
        None => false,
    };
    Ok(HaarFeature { rects, tilted })
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(tag))
}

fn required<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Result<Node<'a, 'input>> {
    child(node, tag).ok_or_else(|| {
        anyhow!(
            "<{}> is missing <{}>",
            node.tag_name().name(),
            tag
        )
    })
}

/// Sequence entries are written as `<_>` elements.
fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element() && n.has_tag_name("_"))
}

/// Text content with comments skipped.
fn text(node: Node) -> String {
    node.children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join(" ")
}

fn numbers<T: std::str::FromStr>(node: Node) -> Result<Vec<T>> {
    text(node)
        .split_whitespace()
        .map(|tok| {
            tok.parse::<T>()
                .map_err(|_| anyhow!("<{}>: invalid number '{}'", node.tag_name().name(), tok))
        })
        .collect()
}

fn parse_scalar<T: std::str::FromStr>(node: Node) -> Result<T> {
    let mut values = numbers::<T>(node)?;
    if values.len() != 1 {
        return Err(anyhow!(
            "<{}> must hold one value, got {}",
            node.tag_name().name(),
            values.len()
        ));
    }
    values
        .pop()
        .ok_or_else(|| anyhow!("<{}> is empty", node.tag_name().name()))
}
