//! Pipeline configuration
//!
//! One structure per stage, each with every tunable value and its default.
//! Loaded from JSON; keys that are absent fall back to their defaults and
//! unknown keys are rejected so a typo never silently does nothing.

use crate::core::{ChurnError, ModelFamily, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    /// Fraction of rows held out for testing
    pub test_fraction: f64,
    /// Seed of the split permutation
    pub seed: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Minority oversampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BalanceConfig {
    pub enabled: bool,
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k_neighbors: 5,
            seed: 42,
        }
    }
}

/// How samples are weighted in the logistic loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// Each class weighted by `n / (2 * n_class)`
    Balanced,
    /// Every sample weighted 1
    None,
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticConfig {
    /// Inverse L2 regularization strength
    pub c: f64,
    pub max_iterations: usize,
    /// Stop when the largest absolute Newton step falls below this
    pub tolerance: f64,
    pub class_weight: ClassWeight,
    pub fit_intercept: bool,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iterations: 1000,
            tolerance: 1e-4,
            class_weight: ClassWeight::Balanced,
            fit_intercept: true,
        }
    }
}

/// Gradient-boosted tree hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled (without replacement) for each tree
    pub subsample: f64,
    /// Multiplier on the gradient and hessian of positive samples
    pub scale_pos_weight: f64,
    /// Minimum hessian sum in a child for a split to be accepted
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// Minimum loss reduction for a split
    pub gamma: f64,
    pub seed: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            max_depth: 4,
            learning_rate: 0.1,
            subsample: 0.8,
            scale_pos_weight: 1.0,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            seed: 42,
        }
    }
}

/// Complete configuration of a preprocessing and training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub balance: BalanceConfig,
    pub logistic: LogisticConfig,
    pub gradient_boosting: GradientBoostingConfig,
}

fn check(ok: bool, message: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(ChurnError::InvalidParameter(message()))
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.test_fraction > 0.0 && self.test_fraction < 1.0, || {
            format!(
                "Test fraction must be between 0 and 1, got: {}",
                self.test_fraction
            )
        })
    }
}

impl BalanceConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.k_neighbors > 0, || {
            "k_neighbors must be at least 1".to_string()
        })
    }
}

impl LogisticConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.c > 0.0 && self.c.is_finite(), || {
            format!("C must be positive, got: {}", self.c)
        })?;
        check(self.max_iterations > 0, || {
            "max_iterations must be at least 1".to_string()
        })?;
        check(self.tolerance > 0.0, || {
            format!("tolerance must be positive, got: {}", self.tolerance)
        })
    }
}

impl GradientBoostingConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.n_estimators > 0, || {
            "n_estimators must be at least 1".to_string()
        })?;
        check(self.max_depth > 0, || "max_depth must be at least 1".to_string())?;
        check(
            self.learning_rate > 0.0 && self.learning_rate <= 1.0,
            || format!("learning_rate must be in (0, 1], got: {}", self.learning_rate),
        )?;
        check(self.subsample > 0.0 && self.subsample <= 1.0, || {
            format!("subsample must be in (0, 1], got: {}", self.subsample)
        })?;
        check(self.scale_pos_weight > 0.0, || {
            format!(
                "scale_pos_weight must be positive, got: {}",
                self.scale_pos_weight
            )
        })?;
        check(self.min_child_weight >= 0.0, || {
            "min_child_weight must be non-negative".to_string()
        })?;
        check(self.reg_lambda >= 0.0, || {
            "reg_lambda must be non-negative".to_string()
        })?;
        check(self.gamma >= 0.0, || "gamma must be non-negative".to_string())
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content).map_err(|e| match e {
            ChurnError::SerializationError(msg) => {
                ChurnError::InvalidParameter(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        Ok(config)
    }

    /// Parse from a JSON string and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ChurnError::SerializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;
        self.balance.validate()?;
        self.logistic.validate()?;
        self.gradient_boosting.validate()
    }

    /// Validate only the sections a run of `family` uses
    pub fn validate_for(&self, family: ModelFamily) -> Result<()> {
        self.balance.validate()?;
        match family {
            ModelFamily::Logistic => self.logistic.validate(),
            ModelFamily::GradientBoosted => self.gradient_boosting.validate(),
        }
    }
}
