//! A small depth-bounded gradient-boosted tree ensemble, boosting the
//! logit under log loss (spec §4.5's preferred model family). Nothing in
//! the retrieval pack depends on an ML crate (`linfa`/`smartcore`/`xgboost`
//! appear nowhere), so the boosting loop and regression trees are
//! hand-rolled here; see DESIGN.md.

use crate::config::GbtConfig;
use crate::error::{Result, SimError};

/// A single node of a depth-bounded CART regression tree fit to pseudo
/// residuals. `gain` is the SSE reduction achieved by a split, accumulated
/// per feature across all trees for gain-based importance. `cover` is the
/// number of training rows that reached this node, recorded at fit time —
/// Tree-SHAP's path weighting needs the real training distribution, not a
/// uniform per-leaf count.
pub(crate) enum TreeNode {
    Leaf {
        value: f64,
        cover: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        cover: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }

    fn accumulate_gain(&self, gains: &mut [f64]) {
        if let TreeNode::Split {
            feature,
            gain,
            left,
            right,
            ..
        } = self
        {
            gains[*feature] += gain;
            left.accumulate_gain(gains);
            right.accumulate_gain(gains);
        }
    }

    fn cover(&self) -> f64 {
        match self {
            TreeNode::Leaf { cover, .. } => *cover,
            TreeNode::Split { cover, .. } => *cover,
        }
    }

    /// Training-cover-weighted expected output of this subtree — the
    /// quantity Tree-SHAP's per-feature contributions are measured
    /// relative to (Lundberg & Lee's `E[f(x)]`).
    fn expected_value(&self) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Split { left, right, .. } => {
                let total = (left.cover() + right.cover()).max(1e-12);
                (left.cover() * left.expected_value() + right.cover() * right.expected_value()) / total
            }
        }
    }
}

pub(crate) struct Tree {
    root: TreeNode,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        self.root.predict(row)
    }
}

fn sse(residuals: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let mean = indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64;
    indices.iter().map(|&i| (residuals[i] - mean).powi(2)).sum()
}

fn leaf_value(residuals: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64
}

/// Exhaustive best-split search: for each feature, sort the candidate rows
/// by that feature's value and scan the midpoints between consecutive
/// distinct values, keeping whichever split minimizes the summed SSE of
/// the two children. Bounded-depth trees over a few hundred rows make this
/// tractable without a histogram approximation.
fn best_split(
    x: &[f64],
    features: usize,
    residuals: &[f64],
    indices: &[usize],
) -> Option<(usize, f64, f64, Vec<usize>, Vec<usize>)> {
    let parent_sse = sse(residuals, indices);
    let mut best: Option<(usize, f64, f64, Vec<usize>, Vec<usize>)> = None;

    for feature in 0..features {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| x[a * features + feature].partial_cmp(&x[b * features + feature]).unwrap());

        for w in 1..sorted.len() {
            let prev_val = x[sorted[w - 1] * features + feature];
            let cur_val = x[sorted[w] * features + feature];
            if (cur_val - prev_val).abs() < 1e-12 {
                continue;
            }
            let threshold = (prev_val + cur_val) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[i * features + feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            let child_sse = sse(residuals, &left) + sse(residuals, &right);
            let gain = parent_sse - child_sse;
            if gain > best.as_ref().map(|(_, _, g, ..)| *g).unwrap_or(0.0) {
                best = Some((feature, threshold, gain, left, right));
            }
        }
    }
    best
}

fn build_tree(
    x: &[f64],
    features: usize,
    residuals: &[f64],
    indices: &[usize],
    depth: u8,
    max_depth: u8,
) -> TreeNode {
    let cover = indices.len() as f64;
    if depth >= max_depth || indices.len() < 4 {
        return TreeNode::Leaf {
            value: leaf_value(residuals, indices),
            cover,
        };
    }
    match best_split(x, features, residuals, indices) {
        Some((feature, threshold, gain, left, right)) => TreeNode::Split {
            feature,
            threshold,
            gain,
            cover,
            left: Box::new(build_tree(x, features, residuals, &left, depth + 1, max_depth)),
            right: Box::new(build_tree(x, features, residuals, &right, depth + 1, max_depth)),
        },
        None => TreeNode::Leaf {
            value: leaf_value(residuals, indices),
            cover,
        },
    }
}

pub struct GbtModel {
    trees: Vec<Tree>,
    learning_rate: f64,
    base_score: f64,
}

impl GbtModel {
    pub fn predict_logit(&self, row: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(row))
                .sum::<f64>()
    }

    pub fn feature_gain(&self, n_features: usize) -> Vec<f64> {
        let mut gains = vec![0.0; n_features];
        for tree in &self.trees {
            tree.root.accumulate_gain(&mut gains);
        }
        let total: f64 = gains.iter().sum();
        if total > 0.0 {
            gains.iter_mut().for_each(|g| *g /= total);
        }
        gains
    }

    /// The ensemble's expected output over the training cover: the base
    /// score plus each tree's own cover-weighted expectation, scaled by
    /// the learning rate. This, not `base_score` alone, is the baseline
    /// Tree-SHAP's per-feature contributions are measured against, so
    /// `shap_row(row).sum() + base_value() == predict_logit(row)` exactly
    /// (spec §4.5/§8 local accuracy).
    pub fn base_value(&self) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.root().expected_value())
                .sum::<f64>()
    }

    pub(crate) fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub(crate) fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Tree {
    pub(crate) fn root(&self) -> &TreeNode {
        &self.root
    }
}

/// One entry of the decision path Tree-SHAP walks while descending a tree,
/// per Lundberg & Lee's "Consistent Individual Feature Attribution for Tree
/// Ensembles" (Algorithm 1). `pweight` is the proportion of size-`t`
/// feature subsets (`t` = path length so far) consistent with this path
/// that SHAP's weighting scheme assigns to this element; `zero_fraction`/
/// `one_fraction` are the fraction of the node's training cover that goes
/// the way `row` goes (one) versus the fraction required to route `row`'s
/// *actual* value and a hypothetical "feature absent" value respectively.
#[derive(Clone, Copy)]
struct PathElement {
    feature_index: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Extend the path with one more split, updating every existing element's
/// `pweight` to account for one more possible feature in the subset sum.
fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature_index: Option<usize>) {
    let l = path.len();
    path.push(PathElement {
        feature_index,
        zero_fraction,
        one_fraction,
        pweight: if l == 0 { 1.0 } else { 0.0 },
    });
    for i in (0..l).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / (l + 1) as f64;
        path[i].pweight = zero_fraction * path[i].pweight * (l - i) as f64 / (l + 1) as f64;
    }
}

/// Remove the element at `path_index` (a previous split on the feature
/// currently being descended again), undoing its contribution to every
/// other element's `pweight`.
fn unwind_path(path: &mut Vec<PathElement>, path_index: usize) {
    let l = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[l].pweight;

    for i in (0..l).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * (l + 1) as f64 / ((i + 1) as f64 * one_fraction);
            next_one_portion = tmp - path[i].pweight * zero_fraction * (l - i) as f64 / (l + 1) as f64;
        } else {
            path[i].pweight = (path[i].pweight * (l + 1) as f64) / (zero_fraction * (l - i) as f64);
        }
    }

    for i in path_index..l {
        path[i].feature_index = path[i + 1].feature_index;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.truncate(l);
}

/// Sum of `pweight` over the path with `path_index` unwound, without
/// mutating `path` — used at each leaf to weight that leaf's contribution
/// to every feature on the path.
fn unwound_path_sum(path: &[PathElement], path_index: usize) -> f64 {
    let l = path.len() - 1;
    let one_fraction = path[path_index].one_fraction;
    let zero_fraction = path[path_index].zero_fraction;
    let mut next_one_portion = path[l].pweight;
    let mut total = 0.0;

    for i in (0..l).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one_portion / ((i + 1) as f64 * one_fraction / (l + 1) as f64);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero_fraction * (l - i) as f64 / (l + 1) as f64;
        } else {
            total += (path[i].pweight / zero_fraction) / ((l - i) as f64 / (l + 1) as f64);
        }
    }
    total
}

fn tree_shap_recurse(
    node: &TreeNode,
    row: &[f64],
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature_index: Option<usize>,
    phi: &mut [f64],
) {
    extend_path(&mut path, zero_fraction, one_fraction, feature_index);

    match node {
        TreeNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                let Some(f) = path[i].feature_index else { continue };
                let weight = unwound_path_sum(&path, i);
                phi[f] += weight * (path[i].one_fraction - path[i].zero_fraction) * value;
            }
        }
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } => {
            let (hot, cold) = if row[*feature] <= *threshold {
                (left.as_ref(), right.as_ref())
            } else {
                (right.as_ref(), left.as_ref())
            };
            let node_cover = node.cover().max(1e-12);
            let hot_zero_fraction = hot.cover() / node_cover;
            let cold_zero_fraction = cold.cover() / node_cover;

            let mut incoming_zero_fraction = 1.0;
            let mut incoming_one_fraction = 1.0;
            if let Some(k) = path.iter().position(|p| p.feature_index == Some(*feature)) {
                incoming_zero_fraction = path[k].zero_fraction;
                incoming_one_fraction = path[k].one_fraction;
                unwind_path(&mut path, k);
            }

            tree_shap_recurse(
                hot,
                row,
                path.clone(),
                hot_zero_fraction * incoming_zero_fraction,
                incoming_one_fraction,
                Some(*feature),
                phi,
            );
            tree_shap_recurse(
                cold,
                row,
                path,
                cold_zero_fraction * incoming_zero_fraction,
                0.0,
                Some(*feature),
                phi,
            );
        }
    }
}

/// Exact path-dependent Tree-SHAP for one tree (Lundberg & Lee): returns
/// the per-feature contribution vector that sums to `tree.predict(row) -
/// E[tree]` exactly, satisfying local accuracy. Summed across the ensemble
/// (scaled by the learning rate) in `shap::gbt_shap`.
pub(crate) fn tree_shap_contributions(tree: &Tree, row: &[f64], n_features: usize) -> Vec<f64> {
    let mut phi = vec![0.0; n_features];
    tree_shap_recurse(tree.root(), row, Vec::new(), 1.0, 1.0, None, &mut phi);
    phi
}

fn sigmoid(x: f64) -> f64 {
    super::sigmoid(x)
}

fn logloss(predictions: &[f64], y: &[u8], indices: &[usize]) -> f64 {
    let mut total = 0.0;
    for &i in indices {
        let p = sigmoid(predictions[i]).clamp(1e-9, 1.0 - 1e-9);
        total -= if y[i] == 1 { p.ln() } else { (1.0 - p).ln() };
    }
    total / indices.len().max(1) as f64
}

/// Fit a GBT ensemble boosting the logit under log loss, early-stopping
/// when held-out logloss does not improve for `config.early_stop_rounds`
/// consecutive rounds (spec §4.5).
pub fn fit(
    x: &[f64],
    features: usize,
    y: &[u8],
    train_idx: &[usize],
    holdout_idx: &[usize],
    config: &GbtConfig,
) -> Result<GbtModel> {
    let positive_rate = train_idx.iter().map(|&i| y[i] as f64).sum::<f64>() / train_idx.len() as f64;
    let positive_rate = positive_rate.clamp(1e-6, 1.0 - 1e-6);
    let base_score = (positive_rate / (1.0 - positive_rate)).ln();

    let rows = y.len();
    let mut predictions = vec![base_score; rows];
    let mut trees: Vec<Tree> = Vec::new();
    let mut best_loss = f64::INFINITY;
    let mut best_len = 0usize;
    let mut rounds_without_improve = 0u32;

    for _ in 0..config.rounds {
        let residuals: Vec<f64> = (0..rows).map(|i| y[i] as f64 - sigmoid(predictions[i])).collect();
        let root = build_tree(x, features, &residuals, train_idx, 0, config.max_depth);
        let tree = Tree { root };

        for i in 0..rows {
            let row = &x[i * features..(i + 1) * features];
            predictions[i] += config.learning_rate * tree.predict(row);
            if !predictions[i].is_finite() {
                return Err(SimError::ModelFitFailure {
                    message: "gradient-boosted tree predictions diverged to a non-finite value".into(),
                });
            }
        }
        trees.push(tree);

        let holdout_loss = if holdout_idx.is_empty() {
            logloss(&predictions, y, train_idx)
        } else {
            logloss(&predictions, y, holdout_idx)
        };
        if !holdout_loss.is_finite() {
            return Err(SimError::ModelFitFailure {
                message: "held-out log loss became non-finite during boosting".into(),
            });
        }

        if holdout_loss < best_loss - 1e-6 {
            best_loss = holdout_loss;
            best_len = trees.len();
            rounds_without_improve = 0;
        } else {
            rounds_without_improve += 1;
            if rounds_without_improve >= config.early_stop_rounds {
                break;
            }
        }
    }

    trees.truncate(best_len.max(1));

    Ok(GbtModel {
        trees,
        learning_rate: config.learning_rate,
        base_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A hand-built depth-2 tree (split on feature 0, then feature 1 on the
    /// right branch) with known per-leaf cover, so the expected SHAP sum
    /// can be computed by hand rather than by re-deriving the algorithm.
    fn two_level_tree() -> Tree {
        let right = TreeNode::Split {
            feature: 1,
            threshold: 0.5,
            gain: 0.0,
            cover: 30.0,
            left: Box::new(TreeNode::Leaf { value: 2.0, cover: 20.0 }),
            right: Box::new(TreeNode::Leaf { value: 3.0, cover: 10.0 }),
        };
        let root = TreeNode::Split {
            feature: 0,
            threshold: 0.5,
            gain: 0.0,
            cover: 70.0,
            left: Box::new(TreeNode::Leaf { value: 1.0, cover: 40.0 }),
            right: Box::new(right),
        };
        Tree { root }
    }

    #[test]
    fn tree_shap_is_locally_accurate_on_a_multi_split_tree() {
        let tree = two_level_tree();
        let row = [1.0, 0.0];
        let predicted = tree.predict(&row);
        let expected = tree.root().expected_value();
        let phi = tree_shap_contributions(&tree, &row, 2);
        let reconstructed: f64 = phi.iter().sum::<f64>() + expected;
        assert!((reconstructed - predicted).abs() < 1e-9, "{reconstructed} vs {predicted}");
    }

    #[test]
    fn tree_shap_assigns_nothing_to_an_unused_feature() {
        let tree = two_level_tree();
        // feature 0 <= 0.5 routes to the single left leaf, so feature 1
        // never participates in this row's path and must get zero credit.
        let row = [0.0, 0.9];
        let phi = tree_shap_contributions(&tree, &row, 2);
        assert_eq!(phi[1], 0.0);
    }
}
