//! Error types for the training pipeline

use thiserror::Error;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Local file or object store read/write failure, or an unreadable columnar file
    #[error("I/O error: {0}")]
    Io(String),

    /// Corrupt or incompatible serialized blob
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A required timestamp could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A required column is absent or holds unusable values
    #[error("Schema error: {0}")]
    Schema(String),

    /// Missing or malformed run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The classifier could not be fitted
    #[error("Training error: {0}")]
    Training(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<digest_gbdt::TrainerError> for PipelineError {
    fn from(err: digest_gbdt::TrainerError) -> Self {
        PipelineError::Training(err.to_string())
    }
}

impl From<digest_gbdt::ModelError> for PipelineError {
    fn from(err: digest_gbdt::ModelError) -> Self {
        match err {
            digest_gbdt::ModelError::Io(e) => PipelineError::Io(e.to_string()),
            digest_gbdt::ModelError::Encoding(e) => PipelineError::Deserialization(e.to_string()),
            other => PipelineError::Training(other.to_string()),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
