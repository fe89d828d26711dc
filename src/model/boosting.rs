//! Second-order gradient-boosted regression trees on the logistic loss
//!
//! Each round fits a depth-limited tree to the gradient `g = p - y` and
//! hessian `h = p (1 - p)` of the current predictions using exact greedy
//! split search. Leaf values already include the learning rate.

use crate::config::GradientBoostingConfig;
use crate::core::{ChurnError, Classifier, ModelFamily, Result};
use crate::model::logistic::sigmoid;
use log::debug;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A node of a regression tree; rows with `x[feature] <= threshold` go left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Largest feature index any split in this tree reads
    pub fn max_split_feature(&self) -> Option<usize> {
        match self {
            TreeNode::Leaf { .. } => None,
            TreeNode::Split {
                feature,
                left,
                right,
                ..
            } => [Some(*feature), left.max_split_feature(), right.max_split_feature()]
                .into_iter()
                .flatten()
                .max(),
        }
    }

    fn count_splits(&self, counts: &mut [usize]) {
        if let TreeNode::Split {
            feature,
            left,
            right,
            ..
        } = self
        {
            if let Some(count) = counts.get_mut(*feature) {
                *count += 1;
            }
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    /// Initial log-odds shared by every prediction
    pub base_score: f64,
    pub learning_rate: f64,
    pub n_features: usize,
    pub trees: Vec<TreeNode>,
}

/// Candidate split found for one feature
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    config: &'a GradientBoostingConfig,
}

impl TreeBuilder<'_> {
    fn leaf_value(&self, g_sum: f64, h_sum: f64) -> f64 {
        -g_sum / (h_sum + self.config.reg_lambda) * self.config.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.config.reg_lambda)
    }

    fn build(&self, indices: &[usize], depth: usize) -> TreeNode {
        let g_sum: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h_sum: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        let leaf = TreeNode::Leaf {
            value: self.leaf_value(g_sum, h_sum),
        };

        if depth >= self.config.max_depth || indices.len() < 2 {
            return leaf;
        }

        let best = (0..self.rows[indices[0]].len())
            .filter_map(|f| self.best_split(indices, f, g_sum, h_sum))
            .max_by(|a, b| {
                a.gain
                    .partial_cmp(&b.gain)
                    .unwrap_or(Ordering::Equal)
                    // Prefer the lower feature index on ties
                    .then(b.feature.cmp(&a.feature))
            });

        match best {
            Some(split) if split.gain > self.config.gamma => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.rows[i][split.feature] <= split.threshold);
                if left.is_empty() || right.is_empty() {
                    return leaf;
                }
                TreeNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(self.build(&left, depth + 1)),
                    right: Box::new(self.build(&right, depth + 1)),
                }
            }
            _ => leaf,
        }
    }

    fn best_split(
        &self,
        indices: &[usize],
        feature: usize,
        g_total: f64,
        h_total: f64,
    ) -> Option<SplitCandidate> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            self.rows[a][feature]
                .partial_cmp(&self.rows[b][feature])
                .unwrap_or(Ordering::Equal)
        });

        let parent = self.score(g_total, h_total);
        let mut g_left = 0.0;
        let mut h_left = 0.0;
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..sorted.len() - 1 {
            let idx = sorted[pos];
            g_left += self.grad[idx];
            h_left += self.hess[idx];

            let value = self.rows[idx][feature];
            let next = self.rows[sorted[pos + 1]][feature];
            if next - value < 1e-12 {
                continue;
            }

            let g_right = g_total - g_left;
            let h_right = h_total - h_left;
            if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight {
                continue;
            }

            let gain = 0.5 * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent);
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (value + next) / 2.0,
                    gain,
                });
            }
        }

        best
    }
}

/// Rows used by one boosting round: a sorted random subset without replacement
fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    if ratio >= 1.0 {
        return indices;
    }
    let k = ((n as f64) * ratio).ceil().max(1.0) as usize;
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

impl BoostedTrees {
    /// Fit on scaled rows with binary labels
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], config: &GradientBoostingConfig) -> Result<Self> {
        config.validate()?;
        let n_features = match rows.first() {
            Some(row) => row.len(),
            None => return Err(ChurnError::EmptyDataset),
        };
        if rows.len() != labels.len() {
            return Err(ChurnError::DimensionMismatch {
                expected: rows.len(),
                actual: labels.len(),
            });
        }
        if labels.iter().all(|&l| l == labels[0]) {
            return Err(ChurnError::Training(
                "training labels contain a single class".to_string(),
            ));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ChurnError::Training(
                "training features contain non-finite values".to_string(),
            ));
        }

        let n = rows.len();
        let targets: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let sample_weights: Vec<f64> = labels
            .iter()
            .map(|&l| if l == 1 { config.scale_pos_weight } else { 1.0 })
            .collect();

        // Base score in log-odds space
        let p = (targets.iter().sum::<f64>() / n as f64).clamp(1e-7, 1.0 - 1e-7);
        let base_score = (p / (1.0 - p)).ln();

        let mut raw = vec![base_score; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for round in 0..config.n_estimators {
            for i in 0..n {
                let prob = sigmoid(raw[i]);
                grad[i] = (prob - targets[i]) * sample_weights[i];
                hess[i] = (prob * (1.0 - prob)).max(1e-16) * sample_weights[i];
            }

            let rows_used = subsample(&mut rng, n, config.subsample);
            let builder = TreeBuilder {
                rows,
                grad: &grad,
                hess: &hess,
                config,
            };
            let tree = builder.build(&rows_used, 0);

            for (r, row) in raw.iter_mut().zip(rows) {
                *r += tree.predict(row);
            }

            if round % 25 == 0 {
                let loss: f64 = raw
                    .iter()
                    .zip(&targets)
                    .map(|(&z, &y)| {
                        let p = sigmoid(z).clamp(1e-15, 1.0 - 1e-15);
                        -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
                    })
                    .sum::<f64>()
                    / n as f64;
                debug!("Boosting round {round}: training log loss {loss:.6}");
            }

            trees.push(tree);
        }

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ChurnError::Training(
                "boosted trees produced non-finite predictions".to_string(),
            ));
        }

        Ok(Self {
            base_score,
            learning_rate: config.learning_rate,
            n_features,
            trees,
        })
    }

    /// Raw log-odds for one scaled row
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }

    /// Largest feature index read by any tree, `None` for an all-leaf ensemble
    pub fn max_split_feature(&self) -> Option<usize> {
        self.trees.iter().filter_map(TreeNode::max_split_feature).max()
    }

    /// Number of splits on each feature across all trees
    pub fn split_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_features];
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        counts
    }
}

impl Classifier for BoostedTrees {
    fn family(&self) -> ModelFamily {
        ModelFamily::GradientBoosted
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.decision_function(features))
    }
}
