//! Engine error taxonomy.

use crate::catalog::CatalogError;
use crate::executor::ExecutorError;

/// Errors surfaced by the audit engine.
///
/// Per-table variants are carried inside a batch report rather than returned;
/// only failures that stop a whole operation come back as `Err`.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Table metadata could not be read by any catalog strategy
    #[error("introspection unavailable for {table}: {reason}")]
    IntrospectionUnavailable { table: String, reason: String },

    /// A trigger create or drop statement was rejected by the backend
    #[error("DDL failed for {table}: {reason}")]
    DdlExecutionFailed { table: String, reason: String },

    /// Session context variables could not be written
    #[error("context propagation failed: {0}")]
    ContextPropagationFailed(String),

    /// The set of tables to operate on could not be determined
    #[error("could not list tables: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Execution(#[from] ExecutorError),

    #[error("configuration error: {0}")]
    Config(String),
}
