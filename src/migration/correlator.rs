//! Correlates migration statements with trigger regeneration.
//!
//! A [`MigrationBatch`] exists only while a migration run is in progress: it is
//! started before the first migration, fed every statement the migrations issue
//! through an [`ObservedExecutor`], and consumed by [`MigrationBatch::finish`],
//! which regenerates triggers for exactly the tables that were created or
//! altered. Nothing carries over from one batch to the next.

use crate::error::AuditError;
use crate::executor::{ExecutorError, SqlExecutor};
use crate::lifecycle::{BatchReport, Outcome, TriggerManager};
use may_postgres::types::ToSql;
use may_postgres::Row;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const IDENT: &str = r#"(?:"(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|[A-Za-z_][A-Za-z0-9_$]*)"#;

static TABLE_TARGET: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:CREATE\s+(?:(?:GLOBAL|LOCAL)\s+)?(?:(?:TEMP|TEMPORARY|UNLOGGED)\s+)?TABLE(?:\s+IF\s+NOT\s+EXISTS)?|ALTER\s+TABLE(?:\s+IF\s+EXISTS)?(?:\s+ONLY)?)\s+(?:{IDENT}\s*\.\s*)*(?P<name>{IDENT})"
    ))
});

/// Normalize one captured identifier: quoted names keep their case, bare names
/// fold to lower case as the backend does. Doubled `""` inside a quoted name is
/// one literal quote.
fn normalize(ident: &str) -> String {
    let quoted = [('"', '"'), ('`', '`'), ('[', ']')]
        .iter()
        .find(|(open, close)| ident.len() >= 2 && ident.starts_with(*open) && ident.ends_with(*close));
    match quoted {
        Some(('"', _)) => ident[1..ident.len() - 1].replace("\"\"", "\""),
        Some(_) => ident[1..ident.len() - 1].to_string(),
        None => ident.to_lowercase(),
    }
}

/// Tables created or altered by `sql`, in statement order, schema prefixes removed.
pub fn extract_table_targets(sql: &str) -> Vec<String> {
    let re = match TABLE_TARGET.as_ref() {
        Ok(re) => re,
        Err(e) => {
            log::error!("Audit: invalid table target pattern: {}", e);
            return Vec::new();
        }
    };
    re.captures_iter(sql)
        .filter_map(|caps| caps.name("name"))
        .map(|m| normalize(m.as_str()))
        .collect()
}

/// Regenerates triggers for a set of tables.
pub trait TriggerRecreator {
    fn recreate(&self, tables: &[String]) -> Result<BatchReport, AuditError>;
}

impl TriggerRecreator for TriggerManager<'_> {
    fn recreate(&self, tables: &[String]) -> Result<BatchReport, AuditError> {
        self.create(Some(tables))
    }
}

/// Tables touched during one migration run.
#[derive(Debug, Default)]
pub struct MigrationBatch {
    touched: RefCell<Vec<String>>,
}

impl MigrationBatch {
    /// Begin collecting with an empty table set.
    pub fn start() -> Self {
        Self::default()
    }

    /// Record any CREATE/ALTER TABLE targets in `sql`.
    pub fn observe(&self, sql: &str) {
        let mut touched = self.touched.borrow_mut();
        for table in extract_table_targets(sql) {
            if !touched.contains(&table) {
                log::debug!("Audit: migration touched table {}", table);
                touched.push(table);
            }
        }
    }

    /// Touched tables so far, first-seen order.
    pub fn touched_tables(&self) -> Vec<String> {
        self.touched.borrow().clone()
    }

    /// End the batch and regenerate triggers for the touched tables.
    ///
    /// Never fails: trigger problems are logged and the report, if any, is
    /// returned for inspection. A batch with no touched tables does nothing.
    pub fn finish(self, recreator: &dyn TriggerRecreator) -> Option<BatchReport> {
        let tables = self.touched.into_inner();
        if tables.is_empty() {
            log::debug!("Audit: migration batch touched no tables");
            return None;
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_batch_span(tables.len()).entered();

        log::info!("Audit: regenerating triggers for {} migrated table(s)", tables.len());
        match recreator.recreate(&tables) {
            Ok(report) => {
                for (table, outcome) in report.iter() {
                    if let Outcome::Failed(reason) = outcome {
                        log::warn!("Audit: could not regenerate triggers for {}: {}", table, reason);
                    }
                }
                Some(report)
            }
            Err(e) => {
                log::warn!("Audit: trigger regeneration after migration failed: {}", e);
                None
            }
        }
    }

    /// End the batch without touching triggers.
    pub fn discard(self) {
        let tables = self.touched.into_inner();
        if !tables.is_empty() {
            log::debug!("Audit: discarding migration batch ({} table(s))", tables.len());
        }
    }
}

/// Executor that reports every successful statement to a batch.
pub struct ObservedExecutor<'a> {
    inner: &'a dyn SqlExecutor,
    batch: &'a MigrationBatch,
}

impl<'a> ObservedExecutor<'a> {
    pub fn new(inner: &'a dyn SqlExecutor, batch: &'a MigrationBatch) -> Self {
        Self { inner, batch }
    }
}

impl SqlExecutor for ObservedExecutor<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, ExecutorError> {
        let affected = self.inner.execute(query, params)?;
        self.batch.observe(query);
        Ok(affected)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, ExecutorError> {
        let rows = self.inner.query_all(query, params)?;
        self.batch.observe(query);
        Ok(rows)
    }
}
