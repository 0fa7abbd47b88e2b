//! Boosted tree classifier model
//!
//! Implements the fixed-point binary classifier produced by the trainer:
//! - Integer-only tree traversal and score accumulation
//! - Canonical JSON serialization with BLAKE3 hashing
//! - Compact bincode encoding for the published artifact

use crate::errors::ModelError;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Fixed-point scale factor (1e6)
pub const SCALE: i64 = 1_000_000;

/// Current model format version
pub const MODEL_VERSION: i32 = 1;

/// Convert a floating point value to fixed-point at [`SCALE`].
///
/// Non-finite values map to 0; out-of-range values saturate.
pub fn to_fixed(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    (value * SCALE as f64).round() as i64
}

/// Logistic function on a fixed-point logit, returning a fixed-point probability.
pub fn sigmoid_fixed(logit: i64) -> i64 {
    let x = logit as f64 / SCALE as f64;
    let p = 1.0 / (1.0 + (-x).exp());
    (p * SCALE as f64).round() as i64
}

/// Inverse of [`sigmoid_fixed`], with the probability clamped away from 0 and 1.
pub fn logit_fixed(probability: i64) -> i64 {
    let p = (probability as f64 / SCALE as f64).clamp(1e-6, 1.0 - 1e-6);
    to_fixed((p / (1.0 - p)).ln())
}

/// Descriptive metadata stored with the model
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// Unix timestamp (seconds) of training completion
    pub created_at: u64,
    pub feature_count: usize,
    pub tree_count: usize,
    pub max_depth: usize,
    pub training_rows: usize,
    /// BLAKE3 hash of the canonical model body (hex)
    pub model_hash: String,
}

/// Binary classifier made of additive regression trees over a logit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    pub version: i32,
    pub scale: i64,
    /// Initial logit (fixed-point)
    pub bias: i64,
    pub trees: Vec<Tree>,
    /// Ordered feature names; rows passed to the model must follow this order
    pub feature_names: Vec<String>,
    pub metadata: ModelMetadata,
}

/// The hashed part of a model. Metadata is excluded so the hash can live in it.
#[derive(Serialize)]
struct ModelBody<'a> {
    version: i32,
    scale: i64,
    bias: i64,
    trees: &'a [Tree],
    feature_names: &'a [String],
}

impl Model {
    pub fn new(trees: Vec<Tree>, bias: i64, feature_names: Vec<String>) -> Self {
        Self {
            version: MODEL_VERSION,
            scale: SCALE,
            bias,
            trees,
            feature_names,
            metadata: ModelMetadata::default(),
        }
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != MODEL_VERSION {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }

        if self.scale != SCALE {
            return Err(ModelError::ValidationFailed(format!(
                "Unsupported scale: {}",
                self.scale
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| {
                ModelError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;

            let max_feature = tree
                .nodes
                .iter()
                .filter(|n| !n.is_leaf())
                .map(|n| n.feature_idx as usize)
                .max();
            if let Some(idx) = max_feature {
                if idx >= self.feature_names.len() {
                    return Err(ModelError::ValidationFailed(format!(
                        "Tree {} references feature {} but model has {} features",
                        i,
                        idx,
                        self.feature_names.len()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Raw fixed-point logit for a fixed-point feature vector
    pub fn score(&self, features: &[i64]) -> i64 {
        self.trees
            .iter()
            .fold(self.bias, |sum, tree| sum.saturating_add(tree.evaluate(features)))
    }

    /// Convert a floating point row to the model's fixed-point representation
    pub fn quantize_row(row: &[f64]) -> Vec<i64> {
        row.iter().map(|&v| to_fixed(v)).collect()
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid_fixed(self.score(&Self::quantize_row(row))) as f64 / SCALE as f64
    }

    /// Predicted label (0 or 1) at a 0.5 probability threshold
    pub fn predict(&self, row: &[f64]) -> u8 {
        self.predict_fixed(&Self::quantize_row(row))
    }

    /// Predicted label for an already quantized row
    pub fn predict_fixed(&self, features: &[i64]) -> u8 {
        u8::from(self.score(features) >= 0)
    }

    /// Predicted labels for a batch of rows
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<u8> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    fn body(&self) -> ModelBody<'_> {
        ModelBody {
            version: self.version,
            scale: self.scale,
            bias: self.bias,
            trees: &self.trees,
            feature_names: &self.feature_names,
        }
    }

    /// BLAKE3 hash (hex) of the canonical JSON model body
    pub fn hash_hex(&self) -> Result<String, ModelError> {
        Ok(hash_canonical_hex(&self.body())?)
    }

    /// Serialize the full model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String, ModelError> {
        Ok(to_canonical_json(self)?)
    }

    /// Encode the model as the binary artifact format
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode and validate a binary artifact
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let model: Model = bincode::deserialize(bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Write the binary artifact to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read a binary artifact from `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn sample_model() -> Model {
        let tree = Tree::new(vec![
            Node::internal(0, 0, to_fixed(0.5), 1, 2),
            Node::leaf(1, -2 * SCALE),
            Node::leaf(2, 2 * SCALE),
        ]);
        Model::new(vec![tree], 0, vec!["has_author".to_string()])
    }

    #[test]
    fn test_fixed_conversions() {
        assert_eq!(to_fixed(1.5), 1_500_000);
        assert_eq!(to_fixed(f64::NAN), 0);
        assert_eq!(sigmoid_fixed(0), SCALE / 2);
        assert!(sigmoid_fixed(10 * SCALE) > 999_000);
        assert!(logit_fixed(SCALE / 2).abs() <= 1);
    }

    #[test]
    fn test_predict() {
        let model = sample_model();
        assert_eq!(model.predict(&[0.0]), 0);
        assert_eq!(model.predict(&[1.0]), 1);
        assert!(model.predict_proba(&[1.0]) > 0.8);
        assert_eq!(model.predict_batch(&[vec![0.0], vec![1.0]]), vec![0, 1]);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_predictions() {
        let model = sample_model();
        let restored = Model::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(model, restored);
        assert_eq!(model.hash_hex().unwrap(), restored.hash_hex().unwrap());
    }

    #[test]
    fn test_hash_ignores_metadata() {
        let mut model = sample_model();
        let before = model.hash_hex().unwrap();
        model.metadata.created_at = 1_700_000_000;
        assert_eq!(before, model.hash_hex().unwrap());

        model.bias = 1;
        assert_ne!(before, model.hash_hex().unwrap());
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        assert!(Model::from_bytes(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_feature() {
        let mut model = sample_model();
        model.feature_names.clear();
        assert!(model.validate().is_err());
    }
}
