//! Statement execution over `may_postgres`.
//!
//! Everything the engine does against the database (catalog queries, trigger DDL,
//! session variables) goes through [`SqlExecutor`], so the lifecycle manager, the
//! migration tap and the context propagator can be driven by a live connection,
//! a transaction-scoped wrapper, or a recording double in tests.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Database execution error
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// `PostgreSQL` error from `may_postgres`
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] PostgresError),
    /// Statement rejected or failed for a reason reported outside the driver
    #[error("Query error: {0}")]
    Query(String),
    /// Row value could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Executes SQL against a single database session.
///
/// Implementations must run every statement on the same physical session;
/// connection-scoped settings written through one call are expected to be
/// visible to the next.
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the statement is rejected by the backend.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError>;

    /// Execute a query and return all rows.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError>;
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError> {
        (**self).execute(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError> {
        (**self).query_all(query, params)
    }
}

/// Executor backed directly by a `may_postgres::Client`.
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }
}

impl SqlExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_statement_span(query).entered();

        let start = Instant::now();
        let result = self.client.execute(query, params).map_err(ExecutorError::from);

        #[cfg(feature = "metrics")]
        METRICS.record_statement(start.elapsed(), result.is_ok());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        result
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_statement_span(query).entered();

        let start = Instant::now();
        let result = self.client.query(query, params).map_err(ExecutorError::from);

        #[cfg(feature = "metrics")]
        METRICS.record_statement(start.elapsed(), result.is_ok());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        result
    }
}

/// Read a text column, mapping driver errors into [`ExecutorError::Parse`].
pub(crate) fn text_column(row: &Row, idx: usize) -> Result<String, ExecutorError> {
    row.try_get::<_, String>(idx)
        .map_err(|e| ExecutorError::Parse(format!("column {idx}: {e}")))
}

/// Read a boolean column, mapping driver errors into [`ExecutorError::Parse`].
pub(crate) fn bool_column(row: &Row, idx: usize) -> Result<bool, ExecutorError> {
    row.try_get::<_, bool>(idx)
        .map_err(|e| ExecutorError::Parse(format!("column {idx}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_error_display() {
        let err = ExecutorError::Query("relation \"users\" does not exist".to_string());
        assert!(err.to_string().contains("Query error"));
        assert!(err.to_string().contains("users"));

        let err = ExecutorError::Parse("column 0: unexpected null".to_string());
        assert!(err.to_string().starts_with("Parse error"));
    }
}
