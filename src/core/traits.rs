//! Core traits for the churn pipeline

use crate::core::{ChurnPrediction, ModelFamily};

/// A fitted binary classifier over scaled feature vectors
pub trait Classifier: Send + Sync {
    /// Family this classifier belongs to
    fn family(&self) -> ModelFamily;

    /// Number of features the classifier was fitted on
    fn n_features(&self) -> usize;

    /// Probability of the positive (churn) class for one scaled row
    fn predict_proba(&self, features: &[f64]) -> f64;

    /// Thresholded prediction for one scaled row
    fn predict(&self, features: &[f64]) -> ChurnPrediction {
        ChurnPrediction::from_probability(self.predict_proba(features))
    }

    /// Probabilities for many rows
    fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }
}
