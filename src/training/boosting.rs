//! Gradient-boosted decision trees for binary classification
//!
//! LightGBM-flavoured booster:
//! - Histogram split finding over quantile bins built from a row sample
//!   (`subsample_for_bin`), missing values always routed right
//! - Leaf-wise (best-first) growth bounded by `num_leaves` and `max_depth`
//! - Optional Gradient-based One-Side Sampling (GOSS)

use crate::error::{FraudError, Result};
use crate::optimizer::{ParameterValue, TrialParams};
use crate::training::model::Classifier;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Boosting flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostingType {
    /// Plain gradient boosting, optional row bagging via `subsample`
    Gbdt,
    /// Gradient-based One-Side Sampling
    Goss,
}

impl std::str::FromStr for BoostingType {
    type Err = FraudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gbdt" => Ok(BoostingType::Gbdt),
            "goss" => Ok(BoostingType::Goss),
            other => Err(FraudError::ConfigError(format!("unknown boosting type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GbdtConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub num_leaves: usize,
    /// `None` means unlimited depth
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    /// Rows sampled to build the bin edges
    pub subsample_for_bin: usize,
    pub max_bin: usize,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub boosting_type: BoostingType,
    pub top_rate: f64,
    pub other_rate: f64,
    pub random_state: Option<u64>,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.028565794309535042,
            num_leaves: 302,
            max_depth: Some(157),
            min_child_samples: 79,
            subsample_for_bin: 290858,
            max_bin: 255,
            reg_alpha: 0.9919573524807885,
            reg_lambda: 0.0,
            subsample: 1.0,
            colsample_bytree: 0.5653288564015742,
            boosting_type: BoostingType::Gbdt,
            top_rate: 0.2,
            other_rate: 0.1,
            random_state: Some(42),
        }
    }
}

impl GbdtConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &str, value: impl ToString, reason: &str) -> FraudError {
            FraudError::InvalidParameter {
                name: name.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", self.n_estimators, "must be positive"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate, "must be positive"));
        }
        if self.num_leaves < 2 {
            return Err(invalid("num_leaves", self.num_leaves, "must be at least 2"));
        }
        if self.max_bin < 2 || self.max_bin > u16::MAX as usize {
            return Err(invalid("max_bin", self.max_bin, "must be in [2, 65535]"));
        }
        if self.subsample_for_bin == 0 {
            return Err(invalid("subsample_for_bin", self.subsample_for_bin, "must be positive"));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(invalid("colsample_bytree", self.colsample_bytree, "must be in (0, 1]"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid("subsample", self.subsample, "must be in (0, 1]"));
        }
        if self.reg_alpha < 0.0 || self.reg_lambda < 0.0 {
            return Err(invalid("reg_alpha/reg_lambda", self.reg_alpha.min(self.reg_lambda), "must be non-negative"));
        }
        if self.boosting_type == BoostingType::Goss
            && !(self.top_rate > 0.0 && self.other_rate > 0.0 && self.top_rate + self.other_rate <= 1.0)
        {
            return Err(invalid(
                "top_rate + other_rate",
                self.top_rate + self.other_rate,
                "GOSS needs positive rates summing to at most 1",
            ));
        }
        Ok(())
    }
}

// ---- Binning ----

/// Quantile bin edges of one feature. Bin `b` holds values in `(edges[b-1], edges[b]]`,
/// the last regular bin holds values above every edge, and one extra bin holds NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinMapper {
    edges: Vec<f64>,
}

impl BinMapper {
    fn fit(values: &mut Vec<f64>, max_bin: usize) -> Self {
        values.retain(|v| !v.is_nan());
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();

        let edges = if values.len() <= 1 {
            Vec::new()
        } else if values.len() <= max_bin {
            values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
        } else {
            let mut edges: Vec<f64> = (1..max_bin)
                .map(|b| values[b * values.len() / max_bin - 1])
                .collect();
            edges.dedup();
            edges
        };
        Self { edges }
    }

    fn n_regular_bins(&self) -> usize {
        self.edges.len() + 1
    }

    fn missing_bin(&self) -> u16 {
        self.n_regular_bins() as u16
    }

    fn bin(&self, v: f64) -> u16 {
        if v.is_nan() {
            self.missing_bin()
        } else {
            self.edges.partition_point(|&e| e < v) as u16
        }
    }
}

/// Column-major binned copy of the training matrix
struct BinnedMatrix {
    mappers: Vec<BinMapper>,
    columns: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    fn build(x: ArrayView2<f64>, config: &GbdtConfig, rng: &mut Xoshiro256PlusPlus) -> Self {
        let n = x.nrows();
        let sample: Vec<usize> = if n > config.subsample_for_bin {
            let mut idx: Vec<usize> = (0..n).collect();
            idx.shuffle(rng);
            idx.truncate(config.subsample_for_bin);
            idx
        } else {
            (0..n).collect()
        };

        let (mappers, columns): (Vec<BinMapper>, Vec<Vec<u16>>) = (0..x.ncols())
            .into_par_iter()
            .map(|j| {
                let col = x.column(j);
                let mut values: Vec<f64> = sample.iter().map(|&i| col[i]).collect();
                let mapper = BinMapper::fit(&mut values, config.max_bin);
                let binned: Vec<u16> = col.iter().map(|&v| mapper.bin(v)).collect();
                (mapper, binned)
            })
            .unzip();

        Self { mappers, columns }
    }
}

// ---- Trees ----

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf { value: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split { feature, threshold, left, right } => {
                // NaN fails the comparison and goes right, matching the missing bin.
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

fn threshold_l1(g: f64, alpha: f64) -> f64 {
    if g.abs() <= alpha { 0.0 } else { g - alpha * g.signum() }
}

fn leaf_weight(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    -threshold_l1(g, alpha) / (h + lambda).max(1e-16)
}

fn leaf_gain(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let g = threshold_l1(g, alpha);
    g * g / (h + lambda).max(1e-16)
}

struct SplitCandidate {
    feature: usize,
    bin: u16,
    threshold: f64,
    gain: f64,
}

fn best_split_for_feature(
    binned: &BinnedMatrix,
    feature: usize,
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
    config: &GbdtConfig,
) -> Option<SplitCandidate> {
    let mapper = &binned.mappers[feature];
    let n_regular = mapper.n_regular_bins();
    if n_regular < 2 {
        return None;
    }

    let column = &binned.columns[feature];
    let mut hist_g = vec![0.0; n_regular + 1];
    let mut hist_h = vec![0.0; n_regular + 1];
    let mut hist_n = vec![0usize; n_regular + 1];
    for &i in indices {
        let b = column[i] as usize;
        hist_g[b] += gradients[i];
        hist_h[b] += hessians[i];
        hist_n[b] += 1;
    }

    let total_g: f64 = hist_g.iter().sum();
    let total_h: f64 = hist_h.iter().sum();
    let total_n = indices.len();
    let parent = leaf_gain(total_g, total_h, config.reg_lambda, config.reg_alpha);

    let mut left_g = 0.0;
    let mut left_h = 0.0;
    let mut left_n = 0usize;
    let mut best: Option<SplitCandidate> = None;

    for b in 0..n_regular - 1 {
        left_g += hist_g[b];
        left_h += hist_h[b];
        left_n += hist_n[b];
        if hist_n[b] == 0 {
            continue;
        }
        let right_n = total_n - left_n;
        if left_n < config.min_child_samples || right_n < config.min_child_samples {
            continue;
        }
        if right_n == 0 {
            break;
        }

        let gain = leaf_gain(left_g, left_h, config.reg_lambda, config.reg_alpha)
            + leaf_gain(total_g - left_g, total_h - left_h, config.reg_lambda, config.reg_alpha)
            - parent;

        if gain > best.as_ref().map_or(0.0, |s| s.gain) {
            best = Some(SplitCandidate {
                feature,
                bin: b as u16,
                threshold: mapper.edges[b],
                gain,
            });
        }
    }
    best
}

fn find_best_split(
    binned: &BinnedMatrix,
    features: &[usize],
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
    config: &GbdtConfig,
) -> Option<SplitCandidate> {
    if indices.len() < config.min_child_samples.max(1) * 2 {
        return None;
    }
    features
        .par_iter()
        .filter_map(|&f| best_split_for_feature(binned, f, gradients, hessians, indices, config))
        .max_by(|a, b| a.gain.partial_cmp(&b.gain).unwrap_or(Ordering::Equal))
}

struct PendingSplit {
    gain: f64,
    node_id: usize,
    split: SplitCandidate,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.gain == other.gain
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain.partial_cmp(&other.gain).unwrap_or(Ordering::Equal)
    }
}

enum NodeSlot {
    Leaf(Vec<usize>),
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Grow one tree best-first until `num_leaves` is reached or no split gains.
fn build_tree(
    binned: &BinnedMatrix,
    gradients: &[f64],
    hessians: &[f64],
    indices: Vec<usize>,
    features: &[usize],
    config: &GbdtConfig,
) -> TreeNode {
    let max_depth = config.max_depth.unwrap_or(usize::MAX);
    let mut nodes: Vec<NodeSlot> = Vec::new();
    let mut depths: Vec<usize> = Vec::new();
    let mut heap: BinaryHeap<PendingSplit> = BinaryHeap::new();

    if max_depth > 0 {
        if let Some(split) = find_best_split(binned, features, gradients, hessians, &indices, config) {
            heap.push(PendingSplit { gain: split.gain, node_id: 0, split });
        }
    }
    nodes.push(NodeSlot::Leaf(indices));
    depths.push(0);

    let mut n_leaves = 1usize;
    while n_leaves < config.num_leaves {
        let pending = match heap.pop() {
            Some(p) => p,
            None => break,
        };
        let node_id = pending.node_id;
        let split = pending.split;

        let node_indices = match std::mem::replace(&mut nodes[node_id], NodeSlot::Leaf(Vec::new())) {
            NodeSlot::Leaf(idx) => idx,
            other => {
                nodes[node_id] = other;
                continue;
            }
        };
        let column = &binned.columns[split.feature];
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            node_indices.into_iter().partition(|&i| column[i] <= split.bin);

        let depth = depths[node_id] + 1;
        let left_id = nodes.len();
        let right_id = left_id + 1;

        for (child_id, child_idx) in [(left_id, &left_idx), (right_id, &right_idx)] {
            if depth < max_depth {
                if let Some(s) = find_best_split(binned, features, gradients, hessians, child_idx, config) {
                    heap.push(PendingSplit { gain: s.gain, node_id: child_id, split: s });
                }
            }
        }

        nodes.push(NodeSlot::Leaf(left_idx));
        nodes.push(NodeSlot::Leaf(right_idx));
        depths.push(depth);
        depths.push(depth);
        nodes[node_id] = NodeSlot::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        n_leaves += 1;
    }

    fn to_node(nodes: &[NodeSlot], idx: usize, g: &[f64], h: &[f64], config: &GbdtConfig) -> TreeNode {
        match &nodes[idx] {
            NodeSlot::Leaf(indices) => {
                let sum_g: f64 = indices.iter().map(|&i| g[i]).sum();
                let sum_h: f64 = indices.iter().map(|&i| h[i]).sum();
                TreeNode::Leaf { value: leaf_weight(sum_g, sum_h, config.reg_lambda, config.reg_alpha) }
            }
            NodeSlot::Split { feature, threshold, left, right } => TreeNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: Box::new(to_node(nodes, *left, g, h, config)),
                right: Box::new(to_node(nodes, *right, g, h, config)),
            },
        }
    }
    to_node(&nodes, 0, gradients, hessians, config)
}

/// GOSS keeps the `top_rate` largest gradients and a random `other_rate` share
/// of the rest, up-weighting the latter by `(1 - top_rate) / other_rate`.
fn goss_sample(
    gradients: &mut [f64],
    hessians: &mut [f64],
    top_rate: f64,
    other_rate: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<usize> {
    let n = gradients.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = ((n as f64 * other_rate).ceil() as usize).min(n - n_top);

    let mut sorted: Vec<usize> = (0..n).collect();
    sorted.sort_by(|&a, &b| gradients[b].abs().total_cmp(&gradients[a].abs()));
    let mut selected: Vec<usize> = sorted[..n_top].to_vec();
    let mut rest: Vec<usize> = sorted[n_top..].to_vec();
    rest.shuffle(rng);

    let amplify = (1.0 - top_rate) / other_rate;
    for &i in rest.iter().take(n_other) {
        gradients[i] *= amplify;
        hessians[i] *= amplify;
        selected.push(i);
    }
    selected
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ============ Classifier ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbdtClassifier {
    pub config: GbdtConfig,
    trees: Vec<TreeNode>,
    base_score: f64,
    n_features: Option<usize>,
}

impl Default for GbdtClassifier {
    fn default() -> Self {
        Self::new(GbdtConfig::default())
    }
}

impl GbdtClassifier {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config, trees: Vec::new(), base_score: 0.0, n_features: None }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn predict_raw(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let n_features = self.n_features.ok_or(FraudError::ModelNotFitted)?;
        if x.ncols() != n_features {
            return Err(FraudError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        let lr = self.config.learning_rate;
        let raw: Vec<f64> = x
            .outer_iter()
            .into_par_iter()
            .map(|row| self.base_score + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>())
            .collect();
        Ok(Array1::from_vec(raw))
    }
}

impl Classifier for GbdtClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        self.config.validate()?;
        let n = x.nrows();
        if n == 0 {
            return Err(FraudError::TrainingError("Empty dataset".into()));
        }
        if y.len() != n {
            return Err(FraudError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        let pos = y.iter().filter(|&&v| v > 0.5).count() as f64;
        let neg = n as f64 - pos;
        if pos == 0.0 || neg == 0.0 {
            return Err(FraudError::TrainingError(
                "training labels contain a single class".into(),
            ));
        }

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let binned = BinnedMatrix::build(x, &self.config, &mut rng);
        let n_features = x.ncols();
        let n_selected = ((n_features as f64 * self.config.colsample_bytree).ceil() as usize).clamp(1, n_features.max(1));

        self.trees.clear();
        self.base_score = (pos / neg).ln();
        let mut raw = Array1::from_elem(n, self.base_score);

        for _ in 0..self.config.n_estimators {
            let mut gradients: Vec<f64> = Vec::with_capacity(n);
            let mut hessians: Vec<f64> = Vec::with_capacity(n);
            for (&r, &yi) in raw.iter().zip(y.iter()) {
                let p = sigmoid(r);
                gradients.push(p - yi);
                hessians.push((p * (1.0 - p)).max(1e-16));
            }

            let indices = match self.config.boosting_type {
                BoostingType::Goss => goss_sample(
                    &mut gradients,
                    &mut hessians,
                    self.config.top_rate,
                    self.config.other_rate,
                    &mut rng,
                ),
                BoostingType::Gbdt if self.config.subsample < 1.0 => {
                    let k = ((n as f64 * self.config.subsample).ceil() as usize).max(1);
                    let mut idx: Vec<usize> = (0..n).collect();
                    idx.shuffle(&mut rng);
                    idx.truncate(k);
                    idx
                }
                BoostingType::Gbdt => (0..n).collect(),
            };

            let mut features: Vec<usize> = (0..n_features).collect();
            features.shuffle(&mut rng);
            features.truncate(n_selected);

            let tree = build_tree(&binned, &gradients, &hessians, indices, &features, &self.config);
            let lr = self.config.learning_rate;
            raw.iter_mut()
                .zip(x.outer_iter())
                .for_each(|(r, row)| *r += lr * tree.predict(row));
            self.trees.push(tree);
        }

        self.n_features = Some(n_features);
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_raw(x)?.mapv(sigmoid))
    }

    fn set_params(&mut self, params: &TrialParams) -> Result<()> {
        let mut config = self.config.clone();
        for (name, value) in params {
            match name.as_str() {
                "n_estimators" => config.n_estimators = usize_param(name, value)?,
                "num_leaves" => config.num_leaves = usize_param(name, value)?,
                "max_depth" => {
                    let depth = int_param(name, value)?;
                    config.max_depth = if depth <= 0 { None } else { Some(depth as usize) };
                }
                "min_child_samples" => config.min_child_samples = usize_param(name, value)?,
                "subsample_for_bin" => config.subsample_for_bin = usize_param(name, value)?,
                "max_bin" => config.max_bin = usize_param(name, value)?,
                "learning_rate" => config.learning_rate = float_param(name, value)?,
                "reg_alpha" => config.reg_alpha = float_param(name, value)?,
                "reg_lambda" => config.reg_lambda = float_param(name, value)?,
                "subsample" => config.subsample = float_param(name, value)?,
                "colsample_bytree" => config.colsample_bytree = float_param(name, value)?,
                "top_rate" => config.top_rate = float_param(name, value)?,
                "other_rate" => config.other_rate = float_param(name, value)?,
                "random_state" => config.random_state = Some(usize_param(name, value)? as u64),
                "boosting_type" => {
                    let s = value.as_string().ok_or_else(|| invalid_type(name, value, "expected a string"))?;
                    config.boosting_type = s.parse()?;
                }
                _ => {
                    return Err(FraudError::InvalidParameter {
                        name: name.clone(),
                        value: format!("{:?}", value),
                        reason: "unknown parameter for the GBDT classifier".to_string(),
                    })
                }
            }
        }
        config.validate()?;
        self.config = config;
        self.trees.clear();
        self.n_features = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.config.boosting_type {
            BoostingType::Gbdt => "gbdt",
            BoostingType::Goss => "goss",
        }
    }
}

fn invalid_type(name: &str, value: &ParameterValue, reason: &str) -> FraudError {
    FraudError::InvalidParameter {
        name: name.to_string(),
        value: format!("{:?}", value),
        reason: reason.to_string(),
    }
}

fn int_param(name: &str, value: &ParameterValue) -> Result<i64> {
    value.as_int().ok_or_else(|| invalid_type(name, value, "expected a number"))
}

fn usize_param(name: &str, value: &ParameterValue) -> Result<usize> {
    let v = int_param(name, value)?;
    usize::try_from(v).map_err(|_| invalid_type(name, value, "must be non-negative"))
}

fn float_param(name: &str, value: &ParameterValue) -> Result<f64> {
    value.as_float().ok_or_else(|| invalid_type(name, value, "expected a number"))
}
