//! Canonical JSON for model hashing
//!
//! Objects are re-emitted with keys in byte order at every depth and the text
//! is compact, so equal models produce equal bytes and equal BLAKE3 digests.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CanonicalError {
    fn from(err: serde_json::Error) -> Self {
        CanonicalError::SerializationError(err.to_string())
    }
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sorted(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        scalar => scalar,
    }
}

/// Compact JSON with recursively sorted object keys
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(serde_json::to_string(&sorted(serde_json::to_value(value)?))?)
}

/// Hex BLAKE3 digest of [`to_canonical_json`]
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(to_canonical_json(value)?.as_bytes());
    Ok(hex::encode(hasher.finalize().as_bytes()))
}
