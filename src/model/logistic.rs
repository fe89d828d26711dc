//! L2-regularized logistic regression fitted by Newton-Raphson
//!
//! Minimizes `0.5 * ||w||^2 + C * sum_i s_i * logloss_i` where `s_i` is the
//! class weight of sample `i`. The intercept is not penalized.

use crate::config::{ClassWeight, LogisticConfig};
use crate::core::{ChurnError, Classifier, ModelFamily, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Fitted logistic regression parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Newton iterations actually run
    pub n_iterations: usize,
    pub converged: bool,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// Per-sample weights: `n / (2 * n_class)` for balanced, 1 otherwise
pub fn sample_weights(labels: &[u8], class_weight: ClassWeight) -> Vec<f64> {
    match class_weight {
        ClassWeight::None => vec![1.0; labels.len()],
        ClassWeight::Balanced => {
            let n = labels.len() as f64;
            let positives = labels.iter().filter(|&&l| l == 1).count() as f64;
            let negatives = n - positives;
            let w_pos = if positives > 0.0 { n / (2.0 * positives) } else { 0.0 };
            let w_neg = if negatives > 0.0 { n / (2.0 * negatives) } else { 0.0 };
            labels
                .iter()
                .map(|&l| if l == 1 { w_pos } else { w_neg })
                .collect()
        }
    }
}

/// Solve `a x = b` for symmetric positive-definite `a`; `None` if `a` is not SPD
fn cholesky_solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = a[i][i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }

    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * y[j]).sum();
        y[i] = (b[i] - sum) / l[i][i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[j][i] * x[j]).sum();
        x[i] = (y[i] - sum) / l[i][i];
    }

    Some(x)
}

/// Objective state shared by the Newton iterations
struct Problem<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    weights: Vec<f64>,
    c: f64,
    n_features: usize,
    fit_intercept: bool,
}

impl Problem<'_> {
    fn dim(&self) -> usize {
        self.n_features + usize::from(self.fit_intercept)
    }

    fn margin(&self, beta: &[f64], row: &[f64]) -> f64 {
        let dot: f64 = row.iter().zip(beta).map(|(x, w)| x * w).sum();
        if self.fit_intercept {
            dot + beta[self.n_features]
        } else {
            dot
        }
    }

    fn objective(&self, beta: &[f64]) -> f64 {
        let penalty: f64 = beta[..self.n_features].iter().map(|w| w * w).sum::<f64>() * 0.5;
        let loss: f64 = self
            .rows
            .iter()
            .zip(self.labels)
            .zip(&self.weights)
            .map(|((row, &y), &s)| {
                let z = self.margin(beta, row);
                s * (softplus(z) - f64::from(y) * z)
            })
            .sum();
        penalty + self.c * loss
    }

    /// Gradient and Hessian of the objective at `beta`
    fn derivatives(&self, beta: &[f64]) -> (Vec<f64>, Vec<Vec<f64>>) {
        let dim = self.dim();
        let mut grad = vec![0.0; dim];
        let mut hess = vec![vec![0.0; dim]; dim];

        for ((row, &y), &s) in self.rows.iter().zip(self.labels).zip(&self.weights) {
            let p = sigmoid(self.margin(beta, row));
            let g = self.c * s * (p - f64::from(y));
            let h = self.c * s * p * (1.0 - p);

            for j in 0..self.n_features {
                grad[j] += g * row[j];
                let hj = h * row[j];
                for k in 0..=j {
                    hess[j][k] += hj * row[k];
                }
            }
            if self.fit_intercept {
                let b = self.n_features;
                grad[b] += g;
                for k in 0..self.n_features {
                    hess[b][k] += h * row[k];
                }
                hess[b][b] += h;
            }
        }

        for j in 0..self.n_features {
            grad[j] += beta[j];
            hess[j][j] += 1.0;
        }
        // Mirror the lower triangle
        for j in 0..dim {
            for k in (j + 1)..dim {
                hess[j][k] = hess[k][j];
            }
        }

        (grad, hess)
    }
}

impl LogisticModel {
    /// Fit on scaled rows with binary labels
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], config: &LogisticConfig) -> Result<Self> {
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

        let problem = Problem {
            rows,
            labels,
            weights: sample_weights(labels, config.class_weight),
            c: config.c,
            n_features,
            fit_intercept: config.fit_intercept,
        };

        let mut beta = vec![0.0; problem.dim()];
        let mut objective = problem.objective(&beta);
        let mut converged = false;
        let mut n_iterations = 0;

        while n_iterations < config.max_iterations {
            n_iterations += 1;
            let (grad, hess) = problem.derivatives(&beta);
            let step = cholesky_solve(&hess, &grad)
                .ok_or_else(|| ChurnError::Training("singular feature matrix".to_string()))?;

            // Backtracking keeps every accepted step a descent step
            let mut t = 1.0;
            let mut candidate: Vec<f64>;
            let mut candidate_objective;
            loop {
                candidate = beta.iter().zip(&step).map(|(b, d)| b - t * d).collect();
                candidate_objective = problem.objective(&candidate);
                if candidate_objective <= objective || t < 1e-10 {
                    break;
                }
                t *= 0.5;
            }

            let max_step = step.iter().map(|d| (t * d).abs()).fold(0.0, f64::max);
            beta = candidate;
            objective = candidate_objective;
            debug!(
                "Newton iteration {}: objective {:.6}, max step {:.3e}",
                n_iterations, objective, max_step
            );

            if max_step < config.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "Logistic regression did not converge in {} iterations",
                config.max_iterations
            );
        }
        if beta.iter().any(|v| !v.is_finite()) {
            return Err(ChurnError::Training(
                "logistic regression produced non-finite coefficients".to_string(),
            ));
        }

        let intercept = if config.fit_intercept {
            beta[n_features]
        } else {
            0.0
        };
        beta.truncate(n_features);

        Ok(Self {
            coefficients: beta,
            intercept,
            n_iterations,
            converged,
        })
    }

    /// Raw log-odds for one scaled row
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        features
            .iter()
            .zip(&self.coefficients)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.intercept
    }
}

impl Classifier for LogisticModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Logistic
    }

    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.decision_function(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn overlapping_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let rows = vec![
            vec![-2.0, 0.5],
            vec![-1.5, -0.3],
            vec![-1.0, 0.1],
            vec![-0.5, 0.9],
            vec![0.2, -0.8],
            vec![0.5, 0.2],
            vec![1.0, -0.4],
            vec![1.5, 0.7],
            vec![2.0, -0.1],
            vec![-0.2, 0.3],
        ];
        let labels = vec![0, 0, 0, 1, 0, 1, 1, 1, 1, 0];
        (rows, labels)
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0 && sigmoid(-800.0) < 1e-300);
        assert_eq!(sigmoid(800.0), 1.0);
        assert_relative_eq!(softplus(0.0), 2f64.ln());
        assert_relative_eq!(softplus(1000.0), 1000.0);
    }

    #[test]
    fn test_balanced_weights() {
        let weights = sample_weights(&[0, 0, 0, 1], ClassWeight::Balanced);
        assert_relative_eq!(weights[0], 4.0 / 6.0);
        assert_relative_eq!(weights[3], 2.0);
        assert_eq!(sample_weights(&[0, 1], ClassWeight::None), vec![1.0, 1.0]);
    }

    #[test]
    fn test_fit_reaches_stationary_point() {
        let (rows, labels) = overlapping_data();
        let config = LogisticConfig::default();
        let model = LogisticModel::fit(&rows, &labels, &config).unwrap();
        assert!(model.converged);

        let problem = Problem {
            rows: &rows,
            labels: &labels,
            weights: sample_weights(&labels, config.class_weight),
            c: config.c,
            n_features: 2,
            fit_intercept: true,
        };
        let mut beta = model.coefficients.clone();
        beta.push(model.intercept);
        let (grad, _) = problem.derivatives(&beta);
        for g in grad {
            assert!(g.abs() < 1e-3, "gradient component {g}");
        }

        // Positive direction of the first feature raises churn probability
        assert!(model.coefficients[0] > 0.0);
        assert!(model.predict_proba(&[2.0, 0.0]) > model.predict_proba(&[-2.0, 0.0]));
    }

    #[test]
    fn test_regularization_shrinks_coefficients() {
        let (rows, labels) = overlapping_data();
        let loose = LogisticModel::fit(&rows, &labels, &LogisticConfig::default()).unwrap();
        let tight = LogisticModel::fit(
            &rows,
            &labels,
            &LogisticConfig {
                c: 0.01,
                ..LogisticConfig::default()
            },
        )
        .unwrap();
        assert!(tight.coefficients[0].abs() < loose.coefficients[0].abs());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (rows, labels) = overlapping_data();
        let a = LogisticModel::fit(&rows, &labels, &LogisticConfig::default()).unwrap();
        let b = LogisticModel::fit(&rows, &labels, &LogisticConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_degenerate_input() {
        let config = LogisticConfig::default();
        assert!(matches!(
            LogisticModel::fit(&[], &[], &config),
            Err(ChurnError::EmptyDataset)
        ));
        assert!(matches!(
            LogisticModel::fit(&[vec![1.0], vec![2.0]], &[1, 1], &config),
            Err(ChurnError::Training(_))
        ));
    }

    #[test]
    fn test_cholesky_solve() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let x = cholesky_solve(&a, &[2.0, 5.0]).unwrap();
        assert_relative_eq!(x[0], -0.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);

        let singular = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert!(cholesky_solve(&singular, &[1.0, 1.0]).is_none());
    }
}
