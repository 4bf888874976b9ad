//! Migration runs regenerate triggers for exactly the tables they touched.

use lifeguard_audit::migration::{
    Migration, MigrationBatch, MigrationError, MigrationRunner, ObservedExecutor, SchemaManager,
};
use lifeguard_audit::quote::QualifiedName;
use lifeguard_audit::test_helpers::{RecordingExecutor, StaticCatalog};
use lifeguard_audit::{
    ColumnDescriptor, ExclusionRules, Outcome, SessionVariables, SqlExecutor, TableDescriptor,
    TriggerGenerator, TriggerManager,
};

fn table(name: &str) -> TableDescriptor {
    TableDescriptor {
        schema: "public".into(),
        name: name.into(),
        primary_key_columns: vec!["id".into()],
        columns: vec![
            ColumnDescriptor::new("id", "int8"),
            ColumnDescriptor::new("label", "text"),
        ],
    }
}

fn catalog() -> StaticCatalog {
    StaticCatalog::new(vec![table("foo"), table("bar"), table("baz")])
}

fn manager<'a>(executor: &'a RecordingExecutor, catalog: &'a StaticCatalog) -> TriggerManager<'a> {
    TriggerManager::new(
        executor,
        catalog,
        ExclusionRules::new("super_audit_logs", Vec::<String>::new()),
        TriggerGenerator::new(
            QualifiedName::new("public", "super_audit_logs"),
            SessionVariables::default(),
        ),
        "public",
    )
}

fn tables_with_new_triggers(executor: &RecordingExecutor) -> Vec<String> {
    executor
        .statements()
        .iter()
        .filter_map(|s| s.strip_prefix("CREATE TRIGGER \"after_insert_"))
        .filter_map(|rest| rest.split('"').next())
        .map(str::to_string)
        .collect()
}

#[test]
fn batch_recreates_only_created_and_altered_tables() {
    let migration_executor = RecordingExecutor::new();
    let trigger_executor = RecordingExecutor::new();
    let catalog = catalog();

    let batch = MigrationBatch::start();
    {
        let observed = ObservedExecutor::new(&migration_executor, &batch);
        observed.execute("CREATE TABLE foo (id bigint primary key, label text)", &[]).unwrap();
        observed.execute("ALTER TABLE bar ADD COLUMN label text", &[]).unwrap();
        observed.execute("UPDATE baz SET label = 'x'", &[]).unwrap();
    }
    let report = batch.finish(&manager(&trigger_executor, &catalog)).unwrap();

    let tables: Vec<&str> = report.iter().map(|(t, _)| t).collect();
    assert_eq!(tables, vec!["foo", "bar"]);
    assert!(report.iter().all(|(_, o)| *o == Outcome::Created));
    assert_eq!(tables_with_new_triggers(&trigger_executor), vec!["foo", "bar"]);
}

#[test]
fn batches_do_not_leak_into_each_other() {
    let executor = RecordingExecutor::new();
    let catalog = catalog();

    let first = MigrationBatch::start();
    first.observe("CREATE TABLE foo (id bigint primary key)");
    first.discard();

    let second = MigrationBatch::start();
    second.observe("ALTER TABLE baz ADD COLUMN x int");
    let report = second.finish(&manager(&executor, &catalog)).unwrap();
    assert_eq!(report.len(), 1);
    assert!(report.get("foo").is_none());
}

struct CreateFoo;

impl Migration for CreateFoo {
    fn name(&self) -> &str {
        "create_foo"
    }

    fn version(&self) -> i64 {
        20240501000000
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute("CREATE TABLE foo (id bigint primary key, label text)", &[])
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.execute("DROP TABLE foo", &[])
    }
}

#[test]
fn trigger_failures_never_fail_the_migration() {
    let migration_executor = RecordingExecutor::new();
    let trigger_executor = RecordingExecutor::new().fail_on("CREATE TRIGGER");
    let catalog = catalog();

    let mut runner = MigrationRunner::new(true);
    runner.register(Box::new(CreateFoo)).unwrap();

    let summary = runner
        .up(&migration_executor, &manager(&trigger_executor, &catalog))
        .unwrap();
    assert_eq!(summary.touched_tables, vec!["foo"]);
    let triggers = summary.triggers.unwrap();
    assert_eq!(triggers.exit_code(), 1);
}

#[test]
fn auto_recreate_can_be_disabled() {
    let migration_executor = RecordingExecutor::new();
    let trigger_executor = RecordingExecutor::new();
    let catalog = catalog();

    let mut runner = MigrationRunner::new(false);
    runner.register(Box::new(CreateFoo)).unwrap();

    let summary = runner
        .up(&migration_executor, &manager(&trigger_executor, &catalog))
        .unwrap();
    assert!(summary.triggers.is_none());
    assert!(trigger_executor.calls().is_empty());
}
