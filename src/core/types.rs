//! Core type definitions for the churn pipeline

use crate::core::{ChurnError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Probability above which a customer is labelled as churning
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Decimal places kept when a probability leaves the crate in a response
pub const RESPONSE_PRECISION: i32 = 4;

/// Predicted churn outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChurnLabel {
    #[serde(rename = "Churn")]
    Churn,
    #[serde(rename = "No Churn")]
    NoChurn,
}

impl ChurnLabel {
    /// Threshold a positive-class probability
    pub fn from_probability(probability: f64) -> Self {
        if probability > DECISION_THRESHOLD {
            ChurnLabel::Churn
        } else {
            ChurnLabel::NoChurn
        }
    }

    /// Binary target value (1 = churned)
    pub fn target(self) -> u8 {
        match self {
            ChurnLabel::Churn => 1,
            ChurnLabel::NoChurn => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChurnLabel::Churn => "Churn",
            ChurnLabel::NoChurn => "No Churn",
        }
    }
}

impl fmt::Display for ChurnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction result containing label and full-precision churn probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnPrediction {
    /// Predicted label
    pub label: ChurnLabel,
    /// Probability of the positive (churn) class
    pub probability: f64,
}

impl ChurnPrediction {
    /// Create a prediction from a positive-class probability
    pub fn from_probability(probability: f64) -> Self {
        Self {
            label: ChurnLabel::from_probability(probability),
            probability,
        }
    }

    /// Presentation form with the probability rounded for display
    pub fn to_response(&self) -> PredictionResponse {
        let factor = 10f64.powi(RESPONSE_PRECISION);
        PredictionResponse {
            prediction: self.label,
            churn_probability: (self.probability * factor).round() / factor,
        }
    }
}

/// Wire shape of a prediction answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: ChurnLabel,
    pub churn_probability: f64,
}

/// The two supported classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    /// L2-regularized logistic regression
    Logistic,
    /// Second-order gradient-boosted trees
    GradientBoosted,
}

impl ModelFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::Logistic => "logistic",
            ModelFamily::GradientBoosted => "gradient-boosted",
        }
    }

    /// File name of the persisted scaler for this family
    pub fn scaler_file_name(self) -> &'static str {
        match self {
            ModelFamily::Logistic => "scaler.json",
            ModelFamily::GradientBoosted => "xgb_scaler.json",
        }
    }

    /// File name of the persisted classifier for this family
    pub fn model_file_name(self) -> &'static str {
        match self {
            ModelFamily::Logistic => "logistic_model.json",
            ModelFamily::GradientBoosted => "xgb_model.json",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = ChurnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logistic" | "lr" => Ok(ModelFamily::Logistic),
            "gradient-boosted" | "gbt" | "xgb" => Ok(ModelFamily::GradientBoosted),
            other => Err(ChurnError::InvalidParameter(format!(
                "Unknown model family: {other}. Use 'logistic' or 'gradient-boosted'"
            ))),
        }
    }
}

/// Dense labelled rows, features in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl Dataset {
    /// Create a dataset, checking that rows and labels line up
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<u8>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(ChurnError::DimensionMismatch {
                expected: features.len(),
                actual: labels.len(),
            });
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(ChurnError::InvalidParameter(format!(
                "Labels must be 0 or 1, got {bad}"
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of features per row (0 for an empty dataset)
    pub fn dim(&self) -> usize {
        self.features.first().map(|row| row.len()).unwrap_or(0)
    }

    /// Counts of (retained, churned) rows
    pub fn class_counts(&self) -> (usize, usize) {
        let churned = self.labels.iter().filter(|&&l| l == 1).count();
        (self.labels.len() - churned, churned)
    }

    /// Fraction of churned rows
    pub fn churn_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.class_counts().1 as f64 / self.len() as f64
    }

    /// Rows at the given indices, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}
