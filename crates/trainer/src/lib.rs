//! Digest score trainer
//!
//! Batch pipeline that trains the click-prediction model behind digest
//! ranking. A sampled interaction table is merged with per-user preference
//! tables, turned into features and labels, fitted with the boosted-tree
//! classifier from `digest-gbdt` and published to object storage.

pub mod config;
pub mod errors;
pub mod features;
pub mod loader;
pub mod merge;
pub mod pipeline;
pub mod prepare;
pub mod store;
pub mod table;
pub mod train;

pub use config::{PipelineConfig, CONFIG_PATH_ENV};
pub use errors::{PipelineError, Result};
pub use loader::{load_columnar, load_named_tables, sample, NamedTables};
pub use merge::{merge, FeatureMerger, JoinKey, KeyResolver};
pub use pipeline::{Pipeline, RunSummary};
pub use prepare::{prepare, FeatureMatrix, FeaturePreparer, LabelVector};
pub use store::{GcsObjectStore, LocalObjectStore, MemoryObjectStore, ObjectStore};
pub use table::{Table, Value};
pub use train::train;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
