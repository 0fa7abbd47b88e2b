use thiserror::Error;

/// Errors returned by the deterministic trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),
}

/// Errors raised while validating, encoding or persisting a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Canonical serialization error: {0}")]
    Canonical(#[from] crate::serde_canon::CanonicalError),

    #[error("Model encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}
