//! Knowledge graph errors

use thiserror::Error;

use crate::model::IdError;
use crate::persistence::{ConflictSignal, StorageError, Structure};

/// Knowledge graph errors
#[derive(Error, Debug)]
pub enum KgError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Id without a known prefix, or of the wrong kind
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdError),

    /// Merge requested with nothing to merge
    #[error("Unsupported merge: {0}")]
    UnsupportedMergeMode(String),

    /// Integrity assertion failed
    #[error("Integrity assertion failed: {0}")]
    IntegrityAssertion(String),

    /// Bulk input does not match the target structure's shape
    #[error("Malformed input for {structure} at key '{key}': {reason}")]
    Ingestion {
        structure: Structure,
        key: String,
        reason: String,
    },

    /// JSON parse error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ConflictSignal for KgError {
    fn is_write_conflict(&self) -> bool {
        matches!(self, KgError::Storage(e) if e.is_write_conflict())
    }
}

impl KgError {
    pub fn is_write_conflict(&self) -> bool {
        ConflictSignal::is_write_conflict(self)
    }
}

pub type KgResult<T> = Result<T, KgError>;
