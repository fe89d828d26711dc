//! Evaluation metrics for binary churn classifiers
//!
//! Metrics are reported only; no threshold on them gates a run.

use crate::core::{ChurnError, Result};
use serde::Serialize;
use std::fmt;

/// Confusion counts, positive class = churn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * (precision * recall) / (precision + recall)
    }
}

impl ConfusionMatrix {
    /// Tally predicted against actual labels
    pub fn from_labels(actual: &[u8], predicted: &[u8]) -> Self {
        let mut m = Self::default();
        for (&a, &p) in actual.iter().zip(predicted) {
            match (p == 1, a == 1) {
                (true, true) => m.true_positives += 1,
                (false, false) => m.true_negatives += 1,
                (true, false) => m.false_positives += 1,
                (false, true) => m.false_negatives += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// `[[TN, FP], [FN, TP]]`
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negatives, self.false_positives],
            [self.false_negatives, self.true_positives],
        ]
    }

    /// Calculate accuracy: (TP + TN) / total
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Calculate precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Calculate recall (sensitivity): TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1_score(&self) -> f64 {
        f1(self.precision(), self.recall())
    }

    /// Calculate specificity: TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }

    /// Precision of the retained class: TN / (TN + FN)
    pub fn negative_predictive_value(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_negatives)
    }
}

/// Precision, recall, F1 and support of one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Full evaluation of a classifier on a labelled partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub confusion: ConfusionMatrix,
    /// Class 0 (retained)
    pub retained: ClassMetrics,
    /// Class 1 (churned)
    pub churned: ClassMetrics,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// `None` when the partition holds a single class
    pub roc_auc: Option<f64>,
}

impl EvaluationReport {
    /// Evaluate positive-class probabilities against true labels
    pub fn from_probabilities(actual: &[u8], probabilities: &[f64], threshold: f64) -> Result<Self> {
        if actual.is_empty() {
            return Err(ChurnError::EmptyDataset);
        }
        if actual.len() != probabilities.len() {
            return Err(ChurnError::DimensionMismatch {
                expected: actual.len(),
                actual: probabilities.len(),
            });
        }

        let predicted: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p > threshold))
            .collect();
        let confusion = ConfusionMatrix::from_labels(actual, &predicted);

        let churned = ClassMetrics {
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1_score: confusion.f1_score(),
            support: confusion.true_positives + confusion.false_negatives,
        };
        let retained_precision = confusion.negative_predictive_value();
        let retained_recall = confusion.specificity();
        let retained = ClassMetrics {
            precision: retained_precision,
            recall: retained_recall,
            f1_score: f1(retained_precision, retained_recall),
            support: confusion.true_negatives + confusion.false_positives,
        };

        let total = confusion.total();
        let macro_avg = average(&retained, &churned, 1.0, 1.0, total);
        let weighted_avg = average(
            &retained,
            &churned,
            retained.support as f64,
            churned.support as f64,
            total,
        );

        Ok(Self {
            confusion,
            retained,
            churned,
            accuracy: confusion.accuracy(),
            macro_avg,
            weighted_avg,
            roc_auc: roc_auc(actual, probabilities),
        })
    }
}

fn average(a: &ClassMetrics, b: &ClassMetrics, wa: f64, wb: f64, support: usize) -> ClassMetrics {
    let sum = wa + wb;
    let mix = |x: f64, y: f64| if sum == 0.0 { 0.0 } else { (x * wa + y * wb) / sum };
    ClassMetrics {
        precision: mix(a.precision, b.precision),
        recall: mix(a.recall, b.recall),
        f1_score: mix(a.f1_score, b.f1_score),
        support,
    }
}

fn write_class_line(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
        name, m.precision, m.recall, m.f1_score, m.support
    )
}

/// Area under the ROC curve via the rank statistic, with tied scores averaged
///
/// Returns `None` unless both classes are present.
pub fn roc_auc(actual: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = actual.iter().filter(|&&l| l == 1).count();
    let negatives = actual.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Sum of 1-based ranks of positives, ties share their average rank
    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + 1 + end) as f64 / 2.0;
        rank_sum += order[start..end]
            .iter()
            .filter(|&&i| actual[i] == 1)
            .count() as f64
            * average_rank;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        write_class_line(f, "No Churn (0)", &self.retained)?;
        write_class_line(f, "Churn (1)", &self.churned)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.confusion.total()
        )?;
        write_class_line(f, "macro avg", &self.macro_avg)?;
        write_class_line(f, "weighted avg", &self.weighted_avg)?;
        writeln!(f)?;
        let rows = self.confusion.as_rows();
        writeln!(f, "Confusion matrix [[TN, FP], [FN, TP]]:")?;
        writeln!(f, "  [[{}, {}],", rows[0][0], rows[0][1])?;
        writeln!(f, "   [{}, {}]]", rows[1][0], rows[1][1])?;
        match self.roc_auc {
            Some(auc) => write!(f, "ROC AUC: {auc:.4}"),
            None => write!(f, "ROC AUC: undefined (single class)"),
        }
    }
}
