//! Digest GBDT - deterministic boosted tree classifier
//!
//! Trains and evaluates Gradient Boosted Decision Tree classifiers with
//! fixed-point arithmetic, so a dataset and configuration always reproduce
//! the same model bytes and hash.
//!
//! Modules:
//! - `tree`, `model`: model representation, inference and artifact encoding
//! - `cart`, `trainer`: tree construction and logistic-loss boosting
//! - `dataset`: fixed-point datasets and holdout splits
//! - `metrics`: classification report
//! - `deterministic`, `serde_canon`: seeded RNG and canonical hashing

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod serde_canon;
pub mod trainer;
pub mod tree;

pub use dataset::{holdout_size, split_indices, Dataset};
pub use deterministic::{permutation, LcgRng, SplitTieBreaker};
pub use errors::{ModelError, TrainerError};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use model::{Model, ModelMetadata, SCALE};
pub use trainer::{GbdtConfig, GbdtTrainer};
pub use tree::{Node, Tree};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
