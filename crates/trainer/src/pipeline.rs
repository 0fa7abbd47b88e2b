//! Pipeline driver
//!
//! Runs every stage in order inside a scratch directory. Any error aborts the
//! run before the upload, so a failed run never publishes an artifact.

use digest_gbdt::ClassificationReport;
use serde::Serialize;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::errors::Result;
use crate::loader::{load_columnar, load_named_tables_file, sample, SAMPLE_SEED};
use crate::merge::FeatureMerger;
use crate::prepare::FeaturePreparer;
use crate::store::ObjectStore;
use crate::train::train;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub base_rows: usize,
    pub sampled_rows: usize,
    pub merged_rows: usize,
    pub training_rows: usize,
    pub preference_tables: usize,
    pub model_object: String,
    pub model_hash: String,
    pub report: ClassificationReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Box<dyn ObjectStore>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Box<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Download, merge, prepare, train and upload
    #[instrument(skip(self), fields(execution_date = %self.config.execution_date))]
    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        if let Some(days) = config.num_days_history {
            info!(num_days_history = days, "History window configured but not applied");
        }

        let workdir = tempfile::tempdir()?;
        let raw_path = workdir.path().join("raw_library_items.parquet");
        let features_path = workdir.path().join("features_user_features.pkl");
        let model_path = workdir.path().join(config.model_file_name());

        let raw_object = config.raw_object();
        self.store.download(&raw_object, &raw_path)?;
        self.store.download(config.features_object(), &features_path)?;

        let base = load_columnar(&raw_path)?;
        let preferences = load_named_tables_file(&features_path)?;
        let base_rows = base.row_count();

        let sampled = sample(&base, config.sample_fraction, SAMPLE_SEED)?;
        let sampled_rows = sampled.row_count();
        info!(base_rows, sampled_rows, "Sampled interaction table");

        let merged = FeatureMerger::new(config.key_resolver()).merge(sampled, &preferences)?;
        let merged_rows = merged.row_count();

        let (x, y) = FeaturePreparer::new(config.feature_columns.clone()).prepare(merged)?;
        let training_rows = x.len();

        let (model, report) = train(&x, &y, &config.gbdt)?;
        model.save(&model_path)?;

        let model_object = config.model_object();
        self.store.upload(&model_path, &model_object)?;
        info!(
            object = %model_object,
            hash = %model.metadata.model_hash,
            trees = model.num_trees(),
            "Published model"
        );

        Ok(RunSummary {
            base_rows,
            sampled_rows,
            merged_rows,
            training_rows,
            preference_tables: preferences.len(),
            model_object,
            model_hash: model.metadata.model_hash,
            report,
        })
    }
}
