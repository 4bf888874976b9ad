//! Test doubles for the executor and the catalog.
//!
//! Available to unit tests and, through the `test-helpers` feature, to the
//! crate-level tests in `tests/`.

use crate::catalog::{CatalogError, CatalogStrategy, TableDescriptor};
use crate::executor::{ExecutorError, SqlExecutor};
use may_postgres::types::ToSql;
use may_postgres::Row;
use std::cell::RefCell;
use std::collections::BTreeSet;

/// One statement seen by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub sql: String,
    /// `Debug` rendering of each parameter.
    pub params: Vec<String>,
}

/// Executor that records every statement instead of running it.
///
/// Statements containing one of the configured substrings fail with
/// [`ExecutorError::Query`]; failed statements are recorded too. Queries
/// return no rows.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: RefCell<Vec<RecordedCall>>,
    fail_on: Vec<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any statement containing `fragment`.
    #[must_use]
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on.push(fragment.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.sql.clone()).collect()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, query: &str, params: &[&dyn ToSql]) -> Result<(), ExecutorError> {
        self.calls.borrow_mut().push(RecordedCall {
            sql: query.to_string(),
            params: params.iter().map(|p| format!("{p:?}")).collect(),
        });
        match self.fail_on.iter().find(|f| query.contains(f.as_str())) {
            Some(fragment) => Err(ExecutorError::Query(format!("injected failure on '{fragment}'"))),
            None => Ok(()),
        }
    }
}

impl SqlExecutor for RecordingExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError> {
        self.record(query, params).map(|()| 0)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError> {
        self.record(query, params).map(|()| Vec::new())
    }
}

/// In-memory catalog over fixed table descriptors.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    tables: Vec<TableDescriptor>,
    triggers: BTreeSet<(String, String)>,
    unavailable: bool,
}

impl StaticCatalog {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self {
            tables,
            ..Self::default()
        }
    }

    /// A catalog whose every query fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Mark `trigger` as attached to `table`.
    #[must_use]
    pub fn with_trigger(mut self, table: &str, trigger: &str) -> Self {
        self.triggers.insert((table.to_string(), trigger.to_string()));
        self
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.unavailable {
            Err(CatalogError::Query(ExecutorError::Query("catalog unavailable".into())))
        } else {
            Ok(())
        }
    }
}

impl CatalogStrategy for StaticCatalog {
    fn name(&self) -> &str {
        "static"
    }

    fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
        self.check()?;
        let mut names: Vec<String> = self.tables.iter().map(|t| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    fn describe_table(&self, table: &str) -> Result<TableDescriptor, CatalogError> {
        self.check()?;
        self.tables
            .iter()
            .find(|t| t.name == table)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound {
                schema: "public".into(),
                table: table.to_string(),
            })
    }

    fn trigger_exists(&self, table: &str, trigger: &str) -> Result<bool, CatalogError> {
        self.check()?;
        Ok(self
            .triggers
            .contains(&(table.to_string(), trigger.to_string())))
    }
}
