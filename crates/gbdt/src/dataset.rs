//! Fixed-point training dataset
//!
//! Converts floating point feature rows into integer features at
//! [`crate::SCALE`] and provides deterministic holdout splitting.

use crate::deterministic::permutation;
use crate::errors::TrainerError;
use crate::model::to_fixed;

/// Training dataset with fixed-point features and 0/1 targets
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<i64>>,
    pub targets: Vec<i64>,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
}

/// Number of holdout rows for `n` samples, rounded up.
pub fn holdout_size(n: usize, test_fraction: f64) -> usize {
    ((n as f64) * test_fraction).ceil() as usize
}

/// Seeded split of `0..n` into (train, test) index sets.
///
/// The first `holdout_size(n, test_fraction)` positions of the permutation
/// form the test set, the remainder the training set.
pub fn split_indices(n: usize, test_fraction: f64, seed: i64) -> (Vec<usize>, Vec<usize>) {
    let order = permutation(n, seed);
    let n_test = holdout_size(n, test_fraction).min(n);
    let test = order[..n_test].to_vec();
    let train = order[n_test..].to_vec();
    (train, test)
}

impl Dataset {
    /// Build a dataset from floating point rows and binary labels
    pub fn from_rows(
        rows: &[Vec<f64>],
        labels: &[u8],
        feature_names: Vec<String>,
    ) -> Result<Self, TrainerError> {
        if rows.len() != labels.len() {
            return Err(TrainerError::Dataset(format!(
                "{} feature rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }

        let feature_count = feature_names.len();
        let mut features = Vec::with_capacity(rows.len());
        let mut targets = Vec::with_capacity(labels.len());

        for (row_idx, (row, &label)) in rows.iter().zip(labels).enumerate() {
            if row.len() != feature_count {
                return Err(TrainerError::Dataset(format!(
                    "Row {}: expected {} features, got {}",
                    row_idx,
                    feature_count,
                    row.len()
                )));
            }
            if label > 1 {
                return Err(TrainerError::Dataset(format!(
                    "Row {}: label {} is not binary",
                    row_idx, label
                )));
            }

            features.push(row.iter().map(|&v| to_fixed(v)).collect());
            targets.push(i64::from(label));
        }

        Ok(Self {
            features,
            targets,
            feature_count,
            feature_names,
        })
    }

    /// Subset of the dataset in the order given by `indices`
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            feature_count: self.feature_count,
            feature_names: self.feature_names.clone(),
        }
    }

    /// Deterministic (train, test) split
    pub fn train_test_split(&self, test_fraction: f64, seed: i64) -> (Self, Self) {
        let (train, test) = split_indices(self.len(), test_fraction, seed);
        (self.select(&train), self.select(&test))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of positive targets
    pub fn positives(&self) -> usize {
        self.targets.iter().filter(|&&t| t == 1).count()
    }

    /// Per-feature fixed-point (min, max); `(i64::MAX, i64::MIN)` when empty
    pub fn feature_stats(&self) -> Vec<(i64, i64)> {
        let mut stats = vec![(i64::MAX, i64::MIN); self.feature_count];

        for row in &self.features {
            for (i, &val) in row.iter().enumerate() {
                stats[i].0 = stats[i].0.min(val);
                stats[i].1 = stats[i].1.max(val);
            }
        }

        stats
    }
}
