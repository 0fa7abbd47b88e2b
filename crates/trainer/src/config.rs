//! Run configuration
//!
//! Resolved once at start-up: built-in defaults, then an optional TOML file
//! named by `DIGEST_SCORE_CONFIG`, then the process environment.

use config::{Config, Environment, File as ConfigFile};
use digest_gbdt::GbdtConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};
use crate::features::default_feature_columns;
use crate::merge::{JoinKey, KeyResolver};

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "DIGEST_SCORE_CONFIG";

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

const FEATURES_OBJECT: &str = "data/features/user_features.pkl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Names the raw interaction file for the run
    pub execution_date: String,
    /// Logged but not used by any stage
    #[serde(default)]
    pub num_days_history: Option<u32>,
    pub gcs_bucket: String,
    #[serde(default = "default_gcs_endpoint")]
    pub gcs_endpoint: String,
    #[serde(default)]
    pub gcs_oauth_token: Option<String>,
    /// Directory-backed bucket root; replaces the HTTP client when set
    #[serde(default)]
    pub local_bucket_root: Option<PathBuf>,
    #[serde(default = "default_sample_fraction")]
    pub sample_fraction: f64,
    #[serde(default = "default_model_version")]
    pub model_version: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub join_keys: BTreeMap<String, JoinKey>,
    #[serde(default)]
    pub strict_join_keys: bool,
    #[serde(default = "default_feature_columns")]
    pub feature_columns: Vec<String>,
    #[serde(default)]
    pub gbdt: GbdtConfig,
}

fn default_gcs_endpoint() -> String {
    DEFAULT_GCS_ENDPOINT.to_string()
}

fn default_sample_fraction() -> f64 {
    0.95
}

fn default_model_version() -> String {
    "v003".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl PipelineConfig {
    /// Load from `DIGEST_SCORE_CONFIG` and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::from_sources(path.as_deref(), None)
    }

    /// Load from an optional file and an environment map.
    ///
    /// `env` replaces the process environment when given.
    pub fn from_sources(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(PipelineError::Config(format!(
                    "configuration file {} not found",
                    path.display()
                )));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::default().source(env.map(|vars| vars.into_iter().collect())));

        let settings = builder.build()?;
        let emulator_host = settings.get_string("storage_emulator_host").ok();
        let endpoint_set = settings.get_string("gcs_endpoint").is_ok();

        let mut config: PipelineConfig = settings.try_deserialize()?;
        if let (Some(host), false) = (emulator_host, endpoint_set) {
            config.gcs_endpoint = host;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution_date.trim().is_empty() {
            return Err(PipelineError::Config("execution_date must not be empty".into()));
        }
        if self.gcs_bucket.trim().is_empty() {
            return Err(PipelineError::Config("gcs_bucket must not be empty".into()));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(PipelineError::Config(format!(
                "sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        if self.feature_columns.is_empty() {
            return Err(PipelineError::Config("feature_columns must not be empty".into()));
        }
        self.gbdt
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn key_resolver(&self) -> KeyResolver {
        KeyResolver::new(self.join_keys.clone(), self.strict_join_keys)
    }

    pub fn features_object(&self) -> &'static str {
        FEATURES_OBJECT
    }

    pub fn raw_object(&self) -> String {
        format!("data/raw/library_items_{}.parquet", self.execution_date)
    }

    pub fn model_file_name(&self) -> String {
        format!("predict_read_model-{}.pkl", self.model_version)
    }

    pub fn model_object(&self) -> String {
        format!("data/models/{}", self.model_file_name())
    }
}
