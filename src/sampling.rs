//! Minority oversampling (SMOTE)
//!
//! Synthesizes new minority-class rows by interpolating between a minority
//! row and one of its nearest minority neighbours until both classes have the
//! same count. Only ever applied to the training partition, before scaling.

use crate::config::BalanceConfig;
use crate::core::{ChurnError, Dataset, Result};
use log::info;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance/index pair ordered by distance, then index, for a max-heap
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Indices of the `k` nearest rows to `rows[target]`, excluding `target` itself
///
/// Ties are broken by lower index so the result is deterministic.
fn nearest_neighbors(rows: &[&[f64]], target: usize, k: usize) -> Vec<usize> {
    let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
    let point = rows[target];

    for (i, row) in rows.iter().enumerate() {
        if i == target {
            continue;
        }
        let candidate = DistIdx(squared_distance(point, row), i);
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }
    }

    let mut neighbors = heap.into_sorted_vec();
    neighbors.truncate(k);
    neighbors.into_iter().map(|DistIdx(_, i)| i).collect()
}

/// SMOTE oversampler with a fixed seed
#[derive(Debug, Clone)]
pub struct Smote {
    k_neighbors: usize,
    seed: u64,
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            k_neighbors: k_neighbors.max(1),
            seed,
        }
    }

    pub fn from_config(config: &BalanceConfig) -> Self {
        Self::new(config.k_neighbors, config.seed)
    }

    /// Return a copy of `data` with synthetic minority rows appended
    ///
    /// The result has exactly as many rows of each class as the majority class
    /// had. A dataset that is already balanced is returned unchanged.
    pub fn balance(&self, data: &Dataset) -> Result<Dataset> {
        if data.is_empty() {
            return Err(ChurnError::EmptyDataset);
        }

        let (negatives, positives) = data.class_counts();
        if negatives == 0 || positives == 0 {
            return Err(ChurnError::Training(
                "training labels contain a single class".to_string(),
            ));
        }

        let (minority_label, n_to_generate) = match positives.cmp(&negatives) {
            Ordering::Less => (1u8, negatives - positives),
            Ordering::Greater => (0u8, positives - negatives),
            Ordering::Equal => return Ok(data.clone()),
        };

        let minority: Vec<&[f64]> = data
            .features
            .iter()
            .zip(&data.labels)
            .filter(|(_, &label)| label == minority_label)
            .map(|(row, _)| row.as_slice())
            .collect();

        let k = self.k_neighbors.min(minority.len().saturating_sub(1));
        let neighbors: Vec<Vec<usize>> = if k == 0 {
            Vec::new()
        } else {
            (0..minority.len())
                .map(|i| nearest_neighbors(&minority, i, k))
                .collect()
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let mut features = data.features.clone();
        let mut labels = data.labels.clone();
        features.reserve(n_to_generate);
        labels.reserve(n_to_generate);

        for _ in 0..n_to_generate {
            let base = rng.gen_range(0..minority.len());
            let sample = minority[base];

            // A lone minority row has no neighbour to interpolate towards
            let synthetic = if k == 0 {
                sample.to_vec()
            } else {
                let neighbor = minority[neighbors[base][rng.gen_range(0..k)]];
                let gap: f64 = rng.gen();
                sample
                    .iter()
                    .zip(neighbor)
                    .map(|(&p, &n)| p + gap * (n - p))
                    .collect()
            };

            features.push(synthetic);
            labels.push(minority_label);
        }

        info!(
            "SMOTE: generated {} synthetic rows of class {} (k={}), {} rows per class",
            n_to_generate,
            minority_label,
            k,
            negatives.max(positives)
        );

        Dataset::new(features, labels)
    }
}

impl Default for Smote {
    fn default() -> Self {
        Self::from_config(&BalanceConfig::default())
    }
}
