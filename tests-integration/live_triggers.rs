//! Live-database tests for the generated triggers.
//!
//! Skipped unless `LIFEGUARD_AUDIT_TEST_DATABASE_URL` points at a PostgreSQL 11+
//! server. Each test works in its own schema and drops it afterwards.

use lifeguard_audit::catalog::PgCatalog;
use lifeguard_audit::migration::{Migration, MigrationError, MigrationRunner, SchemaManager};
use lifeguard_audit::{
    connect, create_audit_table_statements, evaluate, AuditConfig, AuditContext, CatalogStrategy,
    Eligibility, MayPostgresExecutor, Outcome, SchemaCatalog, SkipReason, SqlExecutor, TypeTag,
    TriggerManager,
};
use sea_query::ColumnDef;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

static SCHEMA_SEQ: AtomicUsize = AtomicUsize::new(0);

struct TestSchema {
    executor: MayPostgresExecutor,
    config: AuditConfig,
}

impl TestSchema {
    fn open() -> Option<Self> {
        let url = std::env::var("LIFEGUARD_AUDIT_TEST_DATABASE_URL").ok()?;
        let executor = connect(&url).expect("connect to test database");
        let schema = format!(
            "audit_it_{}_{}",
            std::process::id(),
            SCHEMA_SEQ.fetch_add(1, Ordering::SeqCst)
        );
        executor
            .execute(&format!("CREATE SCHEMA \"{schema}\""), &[])
            .expect("create schema");

        let mut config = AuditConfig::default();
        config.database.url = url;
        config.audit.schema = schema.clone();
        for sql in create_audit_table_statements(&schema, &config.audit.audit_table) {
            executor.execute(&sql, &[]).expect("install audit table");
        }
        Some(Self { executor, config })
    }

    fn schema(&self) -> &str {
        &self.config.audit.schema
    }

    fn run(&self, sql: &str) {
        let sql = sql.replace("{schema}", &format!("\"{}\"", self.schema()));
        self.executor.execute(&sql, &[]).expect(&sql);
    }

    fn with_manager<R>(&self, f: impl FnOnce(&TriggerManager<'_>) -> R) -> R {
        let catalog = SchemaCatalog::postgres(&self.executor, self.schema());
        let manager = TriggerManager::new(
            &self.executor,
            &catalog,
            self.config.exclusion_rules(),
            self.config.trigger_generator(),
            self.schema().to_string(),
        );
        f(&manager)
    }

    /// `(action, record_id, user_id, url, old_data, new_data)` in insertion order.
    fn audit_rows(&self) -> Vec<(String, String, Option<i64>, Option<String>, Value, Value)> {
        let sql = format!(
            "SELECT action::text, record_id::text, user_id, url::text, old_data::text, new_data::text \
             FROM {} ORDER BY id",
            self.config.audit_table()
        );
        let parse = |s: Option<String>| {
            s.map(|s| serde_json::from_str(&s).expect("jsonb text"))
                .unwrap_or(Value::Null)
        };
        self.executor
            .query_all(&sql, &[])
            .expect("read audit rows")
            .iter()
            .map(|row| {
                (
                    row.get(0),
                    row.get(1),
                    row.get(2),
                    row.get(3),
                    parse(row.get(4)),
                    parse(row.get(5)),
                )
            })
            .collect()
    }
}

impl TestSchema {
    fn audited_table_names(&self) -> Vec<String> {
        let sql = format!(
            "SELECT table_name::text FROM {} ORDER BY id",
            self.config.audit_table()
        );
        self.executor
            .query_all(&sql, &[])
            .expect("read audit rows")
            .iter()
            .map(|row| row.get(0))
            .collect()
    }
}

impl Drop for TestSchema {
    fn drop(&mut self) {
        let _ = self.executor.execute(
            &format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema()),
            &[],
        );
    }
}

macro_rules! live_schema {
    () => {
        match TestSchema::open() {
            Some(db) => db,
            None => {
                eprintln!("LIFEGUARD_AUDIT_TEST_DATABASE_URL not set; skipping");
                return;
            }
        }
    };
}

#[test]
fn captures_insert_update_delete() {
    let db = live_schema!();
    db.run("CREATE TABLE {schema}.items (id bigserial PRIMARY KEY, a int, b text, c text, blob bytea)");

    let report = db.with_manager(|m| m.create(None).expect("create"));
    assert_eq!(report.get("items"), Some(&Outcome::Created));
    assert_eq!(
        report.get("super_audit_logs"),
        Some(&Outcome::Skipped(SkipReason::Excluded))
    );

    db.run("INSERT INTO {schema}.items (a, b, c, blob) VALUES (1, 'x', NULL, '\\x00')");
    db.run("UPDATE {schema}.items SET a = 1, b = 'x'");
    db.run("UPDATE {schema}.items SET b = 'y', blob = '\\x01'");
    db.run("UPDATE {schema}.items SET blob = '\\x02'");
    db.run("UPDATE {schema}.items SET c = 'now set'");
    db.run("DELETE FROM {schema}.items");

    let rows = db.audit_rows();
    assert_eq!(rows.len(), 4, "no-op and bytea-only updates record nothing: {rows:?}");

    let (action, record_id, user_id, url, old, new) = &rows[0];
    assert_eq!((action.as_str(), record_id.as_str()), ("insert", "1"));
    assert_eq!((user_id, url), (&None, &None));
    assert_eq!(*old, Value::Null);
    assert_eq!(*new, json!({"id": 1, "a": 1, "b": "x", "c": null}));

    assert_eq!(rows[1].0, "update");
    assert_eq!(rows[1].4, json!({"b": "x"}));
    assert_eq!(rows[1].5, json!({"b": "y"}));

    assert_eq!(rows[2].4, json!({"c": null}));
    assert_eq!(rows[2].5, json!({"c": "now set"}));

    assert_eq!(rows[3].0, "delete");
    assert_eq!(rows[3].4, json!({"id": 1, "a": 1, "b": "y", "c": "now set"}));
    assert_eq!(rows[3].5, Value::Null);
}

#[test]
fn stamps_request_context() {
    let db = live_schema!();
    db.run("CREATE TABLE {schema}.notes (id int PRIMARY KEY, body text)");
    db.with_manager(|m| m.create(None).expect("create"));

    let propagator = db.config.context_propagator();
    {
        let guard = propagator.bind(
            &db.executor,
            &AuditContext::empty().with_user_id(42).with_url("/notes/1"),
        );
        guard
            .execute(
                &format!("INSERT INTO \"{}\".notes VALUES (1, 'hi')", db.schema()),
                &[],
            )
            .expect("insert");
    }
    db.run("UPDATE {schema}.notes SET body = 'bye'");

    let rows = db.audit_rows();
    assert_eq!(rows[0].2, Some(42));
    assert_eq!(rows[0].3.as_deref(), Some("/notes/1"));
    assert_eq!(rows[1].2, None);
    assert_eq!(rows[1].3, None);
}

#[test]
fn drop_is_idempotent_and_counts_existing_triggers() {
    let db = live_schema!();
    db.run("CREATE TABLE {schema}.tags (id int PRIMARY KEY, name text)");

    let first = db.with_manager(|m| m.drop(None).expect("drop"));
    assert_eq!(first.dropped, 0);

    db.with_manager(|m| m.create(None).expect("create"));
    let second = db.with_manager(|m| m.drop(None).expect("drop"));
    assert_eq!(second.dropped, 3);

    let third = db.with_manager(|m| m.drop(None).expect("drop"));
    assert_eq!(third.dropped, 0);
}

#[test]
fn migration_regenerates_triggers_with_new_columns() {
    let db = live_schema!();
    db.run("CREATE TABLE {schema}.tasks (id int PRIMARY KEY, title text)");
    db.with_manager(|m| m.create(None).expect("create"));

    // The migration addresses the table through the search path.
    db.run(&format!("SET search_path TO \"{}\"", db.schema()));
    let mut runner = MigrationRunner::new(db.config.audit.auto_recreate_triggers_on_migration);
    runner.register(Box::new(AddColumnPlain)).expect("register");
    let summary = db.with_manager(|m| runner.up(&db.executor, m).expect("migrate"));
    assert_eq!(summary.touched_tables, vec!["tasks"]);

    db.run("INSERT INTO {schema}.tasks VALUES (1, 't', 5)");
    let rows = db.audit_rows();
    assert_eq!(rows[0].5, json!({"id": 1, "title": "t", "priority": 5}));
}

struct AddColumnPlain;

impl Migration for AddColumnPlain {
    fn name(&self) -> &str {
        "add_priority"
    }

    fn version(&self) -> i64 {
        20240601000000
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.add_column("tasks", ColumnDef::new("priority").integer().null().to_owned())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.drop_column("tasks", "priority")
    }
}

#[test]
fn partitioned_table_writes_one_record_per_change() {
    let db = live_schema!();
    db.run("CREATE TABLE {schema}.events (id int PRIMARY KEY, kind text) PARTITION BY RANGE (id)");
    db.run("CREATE TABLE {schema}.events_p1 PARTITION OF {schema}.events FOR VALUES FROM (0) TO (1000)");

    let report = db.with_manager(|m| m.create(None).expect("create"));
    assert_eq!(report.get("events"), Some(&Outcome::Created));
    assert_eq!(report.get("events_p1"), None);

    db.run("INSERT INTO {schema}.events VALUES (1, 'a')");
    db.run("UPDATE {schema}.events SET kind = 'b'");
    assert_eq!(db.audited_table_names(), vec!["events", "events"]);
}

#[test]
fn domain_columns_are_typed_by_their_base_type() {
    let db = live_schema!();
    db.run("CREATE DOMAIN {schema}.blobdom AS bytea");
    db.run("CREATE TABLE {schema}.documents (id int PRIMARY KEY, title text, payload {schema}.blobdom)");

    let pg = PgCatalog::new(&db.executor, db.schema());
    let descriptor = pg.describe_table("documents").expect("describe");
    let payload = &descriptor.columns[2];
    assert_eq!(payload.data_type, "bytea");
    assert_eq!(payload.type_tag, TypeTag::Binary);

    match evaluate(&descriptor, &db.config.exclusion_rules()) {
        Eligibility::Eligible(table) => {
            assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["id", "title"]);
        }
        other => panic!("expected eligible, got {other:?}"),
    }

    db.with_manager(|m| m.create(None).expect("create"));
    db.run("INSERT INTO {schema}.documents VALUES (1, 't', '\\x00')");
    assert_eq!(db.audit_rows()[0].5, json!({"id": 1, "title": "t"}));
}
