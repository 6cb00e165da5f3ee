//! Error types for RUBRIC operations

use crate::{EntityKind, RecordKey};
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {key}")]
    NotFound { key: RecordKey },

    #[error("Insert failed for {key}: {reason}")]
    InsertFailed { key: RecordKey, reason: String },

    #[error("Update failed for {key}: {reason}")]
    UpdateFailed { key: RecordKey, reason: String },

    #[error("Invalid query on {kind}: {reason}")]
    InvalidQuery { kind: EntityKind, reason: String },

    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Summary rendering errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("Column layout is empty")]
    EmptyLayout,

    #[error("Row has {got} cells but the layout declares {expected} columns")]
    ColumnMismatch { expected: usize, got: usize },
}

/// Synchronization errors raised by the orchestrator and dispatch adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("{referenced_by} references missing record {key}")]
    MissingReference {
        key: RecordKey,
        referenced_by: RecordKey,
    },

    #[error("Snapshot for {target} does not match its kind")]
    SnapshotMismatch { target: RecordKey },

    #[error("Invalid mutation event: {reason}")]
    InvalidEvent { reason: String },

    #[error("{failed} of {attempted} cascade writes failed; first error: {first_error}")]
    PartialFailure {
        failed: usize,
        attempted: usize,
        first_error: String,
    },
}

/// Master error type for all RUBRIC errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RubricError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type alias for RUBRIC operations.
pub type RubricResult<T> = Result<T, RubricError>;

// =============================================================================
// TESTS
// =============================================================================
