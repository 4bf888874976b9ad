//! Trigger lifecycle: create, drop and rebuild across a batch of tables.
//!
//! Tables are processed one at a time in a fixed order. Whatever happens to one
//! table is recorded as an [`Outcome`] in the [`BatchReport`] and the batch moves
//! on; the only `Err` these operations return is failing to work out which
//! tables to visit.
//!
//! Nothing here takes a lock. Two processes rebuilding the same schema at once
//! race at the DDL level; callers serialize lifecycle runs themselves.

use crate::audit_log::AuditAction;
use crate::catalog::CatalogStrategy;
use crate::eligibility::{evaluate, Eligibility, ExclusionRules, SkipReason};
use crate::error::AuditError;
use crate::executor::{ExecutorError, SqlExecutor};
use crate::quote::QualifiedName;
use crate::trigger::{drop_statements, trigger_name, TriggerGenerator, TriggerSet};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Why a table ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Metadata for the table could not be read.
    IntrospectionUnavailable(String),
    /// The backend rejected a trigger statement; the table's transaction was rolled back.
    DdlExecutionFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::IntrospectionUnavailable(reason) => {
                write!(f, "introspection unavailable: {reason}")
            }
            FailureReason::DdlExecutionFailed(reason) => write!(f, "DDL failed: {reason}"),
        }
    }
}

impl FailureReason {
    pub fn into_error(self, table: &str) -> AuditError {
        match self {
            FailureReason::IntrospectionUnavailable(reason) => AuditError::IntrospectionUnavailable {
                table: table.to_string(),
                reason,
            },
            FailureReason::DdlExecutionFailed(reason) => AuditError::DdlExecutionFailed {
                table: table.to_string(),
                reason,
            },
        }
    }
}

/// Terminal state of one table in a create batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Skipped(SkipReason),
    Failed(FailureReason),
}

/// Per-table outcomes of a create batch, in visiting order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    entries: Vec<(String, Outcome)>,
}

impl BatchReport {
    fn push(&mut self, table: String, outcome: Outcome) {
        self.entries.push((table, outcome));
    }

    pub fn get(&self, table: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Created))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Whether any table's trigger DDL was rejected.
    pub fn has_ddl_failures(&self) -> bool {
        self.count(|o| matches!(o, Outcome::Failed(FailureReason::DdlExecutionFailed(_)))) > 0
    }

    /// Process exit status: 1 iff some table's DDL failed.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_ddl_failures())
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Result of a drop pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    /// Triggers that existed and were dropped.
    pub dropped: u64,
    /// Tables visited, in order.
    pub tables: Vec<String>,
    /// Tables whose drop statements were rejected, with the reason.
    pub failures: Vec<(String, String)>,
    /// Tables whose triggers could not be looked up; nothing was dropped for them.
    pub unavailable: Vec<(String, String)>,
}

impl DropReport {
    /// 1 iff some drop statement was rejected, the same rule as [`BatchReport::exit_code`].
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.failures.is_empty())
    }
}

/// Drop pass followed by the create pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub dropped: DropReport,
    pub created: BatchReport,
}

impl RebuildReport {
    pub fn exit_code(&self) -> i32 {
        self.dropped.exit_code().max(self.created.exit_code())
    }
}

/// What a create run would do for one table, without doing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planned {
    Create(Box<TriggerSet>),
    Skip(SkipReason),
    Unavailable(String),
}

/// Split a comma-separated table list; entries are trimmed and empties dropped.
pub fn parse_table_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drives trigger DDL for one schema.
pub struct TriggerManager<'a> {
    executor: &'a dyn SqlExecutor,
    catalog: &'a dyn CatalogStrategy,
    rules: ExclusionRules,
    generator: TriggerGenerator,
    schema: String,
}

impl<'a> TriggerManager<'a> {
    pub fn new(
        executor: &'a dyn SqlExecutor,
        catalog: &'a dyn CatalogStrategy,
        rules: ExclusionRules,
        generator: TriggerGenerator,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            catalog,
            rules,
            generator,
            schema: schema.into(),
        }
    }

    pub fn rules(&self) -> &ExclusionRules {
        &self.rules
    }

    /// Create triggers for every table in `filter`, or every catalog table.
    pub fn create(&self, filter: Option<&[String]>) -> Result<BatchReport, AuditError> {
        self.create_with(filter, |_, _| {})
    }

    /// Like [`create`](Self::create), calling `observer` as each table finishes.
    pub fn create_with<F>(&self, filter: Option<&[String]>, mut observer: F) -> Result<BatchReport, AuditError>
    where
        F: FnMut(&str, &Outcome),
    {
        let tables = self.resolve_tables(filter)?;
        log::info!("Audit: setting up triggers for {} table(s)", tables.len());

        let mut report = BatchReport::default();
        for table in tables {
            let outcome = self.create_one(&table);
            observer(&table, &outcome);
            report.push(table, outcome);
        }

        log::info!(
            "Audit: {} created, {} skipped, {} failed",
            report.created(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Generated triggers per table, nothing executed.
    pub fn plan(&self, filter: Option<&[String]>) -> Result<Vec<(String, Planned)>, AuditError> {
        let tables = self.resolve_tables(filter)?;
        Ok(tables
            .into_iter()
            .map(|table| {
                let planned = match self.eligibility(&table) {
                    Ok(Eligibility::Eligible(eligible)) => {
                        Planned::Create(Box::new(self.generator.build(&eligible)))
                    }
                    Ok(Eligibility::Skipped(reason)) => Planned::Skip(reason),
                    Err(reason) => Planned::Unavailable(reason),
                };
                (table, planned)
            })
            .collect())
    }

    /// Drop audit triggers and their functions; counts only triggers that existed.
    pub fn drop(&self, filter: Option<&[String]>) -> Result<DropReport, AuditError> {
        let tables = self.resolve_tables(filter)?;
        let mut report = DropReport::default();

        for table in tables {
            if self.rules.is_excluded(&table) {
                log::debug!("Audit: {} excluded, not dropping", table);
                continue;
            }

            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::drop_triggers_span(&table).entered();

            match self.drop_one(&table) {
                Ok(count) => {
                    if count > 0 {
                        log::info!("Audit: dropped {} trigger(s) on {}", count, table);
                    }
                    report.dropped += count;
                }
                Err(FailureReason::IntrospectionUnavailable(reason)) => {
                    log::warn!("Audit: cannot inspect triggers on {}: {}", table, reason);
                    report.unavailable.push((table.clone(), reason));
                }
                Err(FailureReason::DdlExecutionFailed(reason)) => {
                    log::warn!("Audit: failed to drop triggers on {}: {}", table, reason);
                    report.failures.push((table.clone(), reason));
                }
            }
            report.tables.push(table);
        }

        #[cfg(feature = "metrics")]
        METRICS.record_dropped(report.dropped);

        Ok(report)
    }

    /// Drop then create. The create pass is skipped only when the drop pass
    /// could not run at all.
    pub fn rebuild(&self, filter: Option<&[String]>) -> Result<RebuildReport, AuditError> {
        self.rebuild_with(filter, |_, _| {})
    }

    /// Like [`rebuild`](Self::rebuild), calling `observer` as each table is recreated.
    pub fn rebuild_with<F>(&self, filter: Option<&[String]>, observer: F) -> Result<RebuildReport, AuditError>
    where
        F: FnMut(&str, &Outcome),
    {
        let dropped = self.drop(filter)?;
        let created = self.create_with(filter, observer)?;
        Ok(RebuildReport { dropped, created })
    }

    /// Tables to visit: the filter (trimmed, de-duplicated, in given order) or
    /// the catalog's list.
    fn resolve_tables(&self, filter: Option<&[String]>) -> Result<Vec<String>, AuditError> {
        match filter {
            Some(names) => {
                let mut seen = BTreeSet::new();
                Ok(names
                    .iter()
                    .map(|n| n.trim())
                    .filter(|n| !n.is_empty() && seen.insert(n.to_string()))
                    .map(str::to_string)
                    .collect())
            }
            None => Ok(self.catalog.list_tables()?),
        }
    }

    fn eligibility(&self, table: &str) -> Result<Eligibility, String> {
        // Excluded tables are decided by name alone, before any catalog query.
        if self.rules.is_excluded(table) {
            return Ok(Eligibility::Skipped(SkipReason::Excluded));
        }
        let descriptor = self.catalog.describe_table(table).map_err(|e| e.to_string())?;
        Ok(evaluate(&descriptor, &self.rules))
    }

    fn create_one(&self, table: &str) -> Outcome {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::create_triggers_span(table).entered();

        let outcome = match self.eligibility(table) {
            Err(reason) => Outcome::Failed(FailureReason::IntrospectionUnavailable(reason)),
            Ok(Eligibility::Skipped(reason)) => Outcome::Skipped(reason),
            Ok(Eligibility::Eligible(eligible)) => {
                let set = self.generator.build(&eligible);
                match self.install(&set) {
                    Ok(()) => Outcome::Created,
                    Err(e) => Outcome::Failed(FailureReason::DdlExecutionFailed(e.to_string())),
                }
            }
        };

        match &outcome {
            Outcome::Created => {
                log::info!("Audit: triggers created for {}", table);
                #[cfg(feature = "metrics")]
                METRICS.record_created(table);
            }
            Outcome::Skipped(reason) => {
                log::debug!("Audit: skipping {}: {}", table, reason);
                #[cfg(feature = "metrics")]
                METRICS.record_skipped();
            }
            Outcome::Failed(reason) => {
                log::warn!("Audit: {} failed: {}", table, reason);
                #[cfg(feature = "metrics")]
                METRICS.record_failed(table);
            }
        }
        outcome
    }

    /// Replace the table's triggers inside one transaction.
    fn install(&self, set: &TriggerSet) -> Result<(), ExecutorError> {
        self.executor.execute("BEGIN", &[])?;

        let result = set
            .drop_statements()
            .iter()
            .map(String::as_str)
            .chain(set.create_statements())
            .try_for_each(|sql| self.executor.execute(sql, &[]).map(|_| ()));

        match result {
            Ok(()) => self.executor.execute("COMMIT", &[]).map(|_| ()),
            Err(e) => {
                if let Err(rollback) = self.executor.execute("ROLLBACK", &[]) {
                    log::error!("Audit: rollback failed for {}: {}", set.table, rollback);
                }
                Err(e)
            }
        }
    }

    fn drop_one(&self, table: &str) -> Result<u64, FailureReason> {
        let relation = QualifiedName::new(self.schema.clone(), table);
        let mut dropped = 0;
        for action in AuditAction::ALL {
            let name = trigger_name(action, table);
            let exists = self
                .catalog
                .trigger_exists(table, &name)
                .map_err(|e| FailureReason::IntrospectionUnavailable(e.to_string()))?;
            let [drop_trigger, drop_function] = drop_statements(&relation, action);
            if exists {
                self.executor
                    .execute(&drop_trigger, &[])
                    .map_err(|e| FailureReason::DdlExecutionFailed(e.to_string()))?;
                dropped += 1;
            }
            // The function may outlive its trigger after a partial manual cleanup.
            self.executor
                .execute(&drop_function, &[])
                .map_err(|e| FailureReason::DdlExecutionFailed(e.to_string()))?;
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, TableDescriptor};
    use crate::context::SessionVariables;
    use crate::test_helpers::{RecordingExecutor, StaticCatalog};

    fn table(name: &str) -> TableDescriptor {
        TableDescriptor {
            schema: "public".into(),
            name: name.into(),
            primary_key_columns: vec!["id".into()],
            columns: vec![
                ColumnDescriptor::new("id", "int8"),
                ColumnDescriptor::new("name", "text"),
            ],
        }
    }

    fn generator() -> TriggerGenerator {
        TriggerGenerator::new(
            QualifiedName::new("public", "super_audit_logs"),
            SessionVariables::default(),
        )
    }

    fn manager<'a>(executor: &'a RecordingExecutor, catalog: &'a StaticCatalog) -> TriggerManager<'a> {
        TriggerManager::new(
            executor,
            catalog,
            ExclusionRules::new("super_audit_logs", Vec::<String>::new()),
            generator(),
            "public",
        )
    }

    #[test]
    fn test_parse_table_list() {
        assert_eq!(parse_table_list(" users, ,orders ,"), vec!["users", "orders"]);
        assert!(parse_table_list("").is_empty());
    }

    #[test]
    fn test_create_wraps_each_table_in_a_transaction() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::new(vec![table("users")]);

        let report = manager(&executor, &catalog).create(None).unwrap();
        assert_eq!(report.get("users"), Some(&Outcome::Created));

        let sql = executor.statements();
        assert_eq!(sql.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(sql.last().map(String::as_str), Some("COMMIT"));
        // 6 drops + 3 functions + 3 triggers between BEGIN and COMMIT.
        assert_eq!(sql.len(), 14);
        assert!(sql[1].starts_with("DROP TRIGGER IF EXISTS \"after_insert_users\""));
    }

    #[test]
    fn test_failed_table_is_rolled_back_and_batch_continues() {
        let executor = RecordingExecutor::new().fail_on("CREATE TRIGGER \"after_update_orders\"");
        let catalog = StaticCatalog::new(vec![table("accounts"), table("orders"), table("users")]);

        let report = manager(&executor, &catalog).create(None).unwrap();
        assert_eq!(report.get("accounts"), Some(&Outcome::Created));
        assert!(matches!(
            report.get("orders"),
            Some(Outcome::Failed(FailureReason::DdlExecutionFailed(_)))
        ));
        assert_eq!(report.get("users"), Some(&Outcome::Created));
        assert_eq!(report.exit_code(), 1);
        assert!(executor.statements().iter().any(|s| s == "ROLLBACK"));
    }

    #[test]
    fn test_excluded_tables_cost_no_catalog_queries() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::new(vec![]);
        let filter = vec!["Sessions".to_string()];

        let report = manager(&executor, &catalog).create(Some(&filter)).unwrap();
        assert_eq!(report.get("Sessions"), Some(&Outcome::Skipped(SkipReason::Excluded)));
        assert_eq!(report.exit_code(), 0);
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_unknown_table_is_reported_not_fatal() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::new(vec![table("users")]);
        let filter = vec!["ghosts".to_string(), "users".to_string()];

        let report = manager(&executor, &catalog).create(Some(&filter)).unwrap();
        assert!(matches!(
            report.get("ghosts"),
            Some(Outcome::Failed(FailureReason::IntrospectionUnavailable(_)))
        ));
        assert_eq!(report.get("users"), Some(&Outcome::Created));
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_drop_counts_only_existing_triggers() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::new(vec![table("users"), table("orders")])
            .with_trigger("users", "after_insert_users")
            .with_trigger("users", "after_delete_users");

        let report = manager(&executor, &catalog).drop(None).unwrap();
        assert_eq!(report.dropped, 2);
        assert!(report.failures.is_empty());

        let drops: Vec<String> = executor
            .statements()
            .into_iter()
            .filter(|s| s.starts_with("DROP TRIGGER"))
            .collect();
        assert_eq!(drops.len(), 2);
    }

    #[test]
    fn test_drop_lookup_failure_does_not_fail_the_exit_code() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::unavailable();
        let filter = vec!["users".to_string()];

        let report = manager(&executor, &catalog).drop(Some(&filter)).unwrap();
        assert_eq!(report.dropped, 0);
        assert!(report.failures.is_empty());
        assert_eq!(report.unavailable.len(), 1);
        assert_eq!(report.unavailable[0].0, "users");
        assert_eq!(report.exit_code(), 0);
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_rejected_drop_statement_fails_the_exit_code() {
        let executor = RecordingExecutor::new().fail_on("DROP FUNCTION");
        let catalog = StaticCatalog::new(vec![table("users")]);

        let report = manager(&executor, &catalog).drop(None).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.unavailable.is_empty());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_plan_executes_nothing() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::new(vec![table("users")]);

        let plan = manager(&executor, &catalog).plan(None).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(matches!(&plan[0].1, Planned::Create(set) if set.table.name == "users"));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_rebuild_aborts_when_tables_cannot_be_listed() {
        let executor = RecordingExecutor::new();
        let catalog = StaticCatalog::unavailable();

        let result = manager(&executor, &catalog).rebuild(None);
        assert!(matches!(result, Err(AuditError::Catalog(_))));
        assert!(executor.calls().is_empty());
    }
}
