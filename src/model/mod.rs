//! Classifier families
//!
//! Both families are fitted on scaled feature rows and produce the
//! probability of the churn class.

pub mod boosting;
pub mod logistic;

pub use self::boosting::{BoostedTrees, TreeNode};
pub use self::logistic::LogisticModel;

use crate::config::PipelineConfig;
use crate::core::{Classifier, ModelFamily, Result};
use serde::{Deserialize, Serialize};

/// A fitted classifier of either family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "kebab-case")]
pub enum TrainedClassifier {
    Logistic(LogisticModel),
    GradientBoosted(BoostedTrees),
}

impl TrainedClassifier {
    /// Fit a classifier of `family` with the hyperparameters from `config`
    pub fn fit(
        family: ModelFamily,
        rows: &[Vec<f64>],
        labels: &[u8],
        config: &PipelineConfig,
    ) -> Result<Self> {
        match family {
            ModelFamily::Logistic => {
                LogisticModel::fit(rows, labels, &config.logistic).map(TrainedClassifier::Logistic)
            }
            ModelFamily::GradientBoosted => {
                BoostedTrees::fit(rows, labels, &config.gradient_boosting)
                    .map(TrainedClassifier::GradientBoosted)
            }
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedClassifier::Logistic(m) => m,
            TrainedClassifier::GradientBoosted(m) => m,
        }
    }

    /// Raw log-odds for one scaled row
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        match self {
            TrainedClassifier::Logistic(m) => m.decision_function(features),
            TrainedClassifier::GradientBoosted(m) => m.decision_function(features),
        }
    }

    /// Every stored parameter is finite
    pub fn is_finite(&self) -> bool {
        match self {
            TrainedClassifier::Logistic(m) => {
                m.intercept.is_finite() && m.coefficients.iter().all(|w| w.is_finite())
            }
            TrainedClassifier::GradientBoosted(m) => {
                fn finite(node: &TreeNode) -> bool {
                    match node {
                        TreeNode::Leaf { value } => value.is_finite(),
                        TreeNode::Split {
                            threshold,
                            left,
                            right,
                            ..
                        } => threshold.is_finite() && finite(left) && finite(right),
                    }
                }
                m.base_score.is_finite() && m.trees.iter().all(finite)
            }
        }
    }

    /// One-line description for logs and `info` output
    pub fn summary(&self) -> String {
        match self {
            TrainedClassifier::Logistic(m) => format!(
                "logistic regression, {} coefficients, intercept {:.6}, {} Newton iterations{}",
                m.coefficients.len(),
                m.intercept,
                m.n_iterations,
                if m.converged { "" } else { " (not converged)" }
            ),
            TrainedClassifier::GradientBoosted(m) => format!(
                "gradient-boosted trees, {} trees, max depth {}, learning rate {}",
                m.trees.len(),
                m.trees.iter().map(TreeNode::depth).max().unwrap_or(0),
                m.learning_rate
            ),
        }
    }
}

impl Classifier for TrainedClassifier {
    fn family(&self) -> ModelFamily {
        self.inner().family()
    }

    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        self.inner().predict_proba(features)
    }
}
