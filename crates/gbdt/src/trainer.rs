//! Gradient Boosted Decision Tree (GBDT) classifier trainer
//!
//! Boosts CART trees on the logistic loss. Every step after the bias uses
//! fixed-point integers and the split search is tie-broken deterministically,
//! so the same dataset and configuration always yield the same trees.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::errors::TrainerError;
use crate::model::{logit_fixed, sigmoid_fixed, Model, ModelMetadata, SCALE};
use crate::tree::Tree;

/// GBDT training configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GbdtConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fixed-point shrinkage, e.g. 300_000 = 0.3
    pub learning_rate: i64,
    pub quant_step: i64,
    /// Fixed-point L2 penalty on leaf weights
    pub l2_regularization: i64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            num_trees: 5,
            max_depth: 7,
            min_samples_leaf: 1,
            learning_rate: 300_000,
            quant_step: 1,
            l2_regularization: SCALE,
        }
    }
}

impl GbdtConfig {
    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            quant_step: self.quant_step,
            l2_regularization: self.l2_regularization,
        }
    }

    pub fn validate(&self) -> Result<(), TrainerError> {
        if self.num_trees == 0 {
            return Err(TrainerError::Training("num_trees must be positive".into()));
        }
        if self.learning_rate <= 0 {
            return Err(TrainerError::Training("learning_rate must be positive".into()));
        }
        if self.l2_regularization < 0 {
            return Err(TrainerError::Training("l2_regularization must not be negative".into()));
        }
        Ok(())
    }
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GbdtConfig {
        &self.config
    }

    /// Fit a classifier on the given dataset
    pub fn train(&self, dataset: &Dataset) -> Result<Model, TrainerError> {
        self.config.validate()?;

        if dataset.is_empty() {
            return Err(TrainerError::Dataset("cannot train on an empty dataset".into()));
        }

        let n_samples = dataset.len();
        let base_rate = (dataset.positives() as i128 * SCALE as i128 / n_samples as i128) as i64;
        let bias = logit_fixed(base_rate);

        info!(
            samples = n_samples,
            features = dataset.feature_count,
            positives = dataset.positives(),
            "Fitting {} trees",
            self.config.num_trees
        );

        let mut predictions = vec![bias; n_samples];
        let mut trees = Vec::with_capacity(self.config.num_trees);

        for tree_idx in 0..self.config.num_trees {
            let (gradients, hessians) = self.gradients_hessians(&dataset.targets, &predictions);

            let builder = CartBuilder::new(
                &dataset.features,
                &gradients,
                &hessians,
                self.config.tree_config(),
            );
            let tree = self.shrink(builder.build());

            for (pred, row) in predictions.iter_mut().zip(&dataset.features) {
                *pred = pred.saturating_add(tree.evaluate(row));
            }

            debug!(
                tree = tree_idx + 1,
                nodes = tree.nodes.len(),
                depth = tree.depth(),
                "Tree fitted"
            );
            trees.push(tree);
        }

        let mut model = Model::new(trees, bias, dataset.feature_names.clone());
        model.metadata = ModelMetadata {
            created_at: chrono::Utc::now().timestamp().max(0) as u64,
            feature_count: dataset.feature_count,
            tree_count: model.trees.len(),
            max_depth: model.trees.iter().map(Tree::depth).max().unwrap_or(0),
            training_rows: n_samples,
            model_hash: model
                .hash_hex()
                .map_err(|e| TrainerError::Training(e.to_string()))?,
        };

        Ok(model)
    }

    /// Logistic loss derivatives: gradient = p - y, hessian = p(1 - p)
    fn gradients_hessians(&self, targets: &[i64], predictions: &[i64]) -> (Vec<i64>, Vec<i64>) {
        targets
            .iter()
            .zip(predictions)
            .map(|(&target, &logit)| {
                let p = sigmoid_fixed(logit);
                let gradient = p - target * SCALE;
                let hessian = ((p as i128 * (SCALE - p) as i128) / SCALE as i128).max(1) as i64;
                (gradient, hessian)
            })
            .unzip()
    }

    /// Scale every leaf by the learning rate
    fn shrink(&self, mut tree: Tree) -> Tree {
        for node in tree.nodes.iter_mut() {
            if let Some(value) = node.leaf {
                let scaled = (value as i128 * self.config.learning_rate as i128) / SCALE as i128;
                node.leaf = Some(scaled as i64);
            }
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_dataset() -> Dataset {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, (i % 3) as f64])
            .collect();
        let labels: Vec<u8> = (0..40).map(|i| u8::from(i >= 20)).collect();
        Dataset::from_rows(&rows, &labels, vec!["x".into(), "noise".into()]).unwrap()
    }

    #[test]
    fn test_train_simple_model() {
        let dataset = separable_dataset();
        let model = GbdtTrainer::new(GbdtConfig::default()).train(&dataset).unwrap();

        assert_eq!(model.trees.len(), 5);
        assert_eq!(model.metadata.feature_count, 2);
        assert_eq!(model.metadata.training_rows, 40);
        assert!(model.validate().is_ok());

        assert_eq!(model.predict(&[2.0, 0.0]), 0);
        assert_eq!(model.predict(&[35.0, 1.0]), 1);
    }

    #[test]
    fn test_balanced_bias_is_zero() {
        let model = GbdtTrainer::new(GbdtConfig::default())
            .train(&separable_dataset())
            .unwrap();
        assert!(model.bias.abs() <= 1);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let dataset = Dataset::from_rows(&[], &[], vec!["x".into()]).unwrap();
        assert!(GbdtTrainer::new(GbdtConfig::default()).train(&dataset).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GbdtConfig {
            num_trees: 0,
            ..GbdtConfig::default()
        };
        assert!(GbdtTrainer::new(config).train(&separable_dataset()).is_err());
    }

    #[test]
    fn test_determinism() {
        let dataset = separable_dataset();
        let model1 = GbdtTrainer::new(GbdtConfig::default()).train(&dataset).unwrap();
        let model2 = GbdtTrainer::new(GbdtConfig::default()).train(&dataset).unwrap();

        assert_eq!(model1.trees, model2.trees);
        assert_eq!(model1.bias, model2.bias);
        assert_eq!(model1.metadata.model_hash, model2.metadata.model_hash);
    }
}
