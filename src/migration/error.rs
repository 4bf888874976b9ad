//! Migration-specific error types

use crate::executor::ExecutorError;

/// Migration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Database execution error
    #[error("Database error: {0}")]
    Database(#[from] ExecutorError),

    /// Two registered migrations share a version
    #[error("Migration version {version} registered twice ('{existing}' and '{name}')")]
    DuplicateVersion {
        version: i64,
        existing: String,
        name: String,
    },

    /// Migration failed during execution
    #[error("Migration '{name}' (version {version}) failed during execution: {error}")]
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },

    /// Invalid migration version
    #[error("Invalid migration version: {0}")]
    InvalidVersion(i64),
}
