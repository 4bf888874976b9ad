//! Trigger generation and lifecycle behaviour through the public API.

use lifeguard_audit::test_helpers::{RecordingExecutor, StaticCatalog};
use lifeguard_audit::{
    evaluate, ColumnDescriptor, Eligibility, ExclusionRules, FailureReason, Outcome,
    SessionVariables, SkipReason, TableDescriptor, TriggerGenerator, TriggerManager,
};
use lifeguard_audit::quote::QualifiedName;

fn table(name: &str, pk: &[&str], columns: &[(&str, &str)]) -> TableDescriptor {
    TableDescriptor {
        schema: "public".into(),
        name: name.into(),
        primary_key_columns: pk.iter().map(|s| s.to_string()).collect(),
        columns: columns
            .iter()
            .map(|(n, t)| ColumnDescriptor::new(*n, *t))
            .collect(),
    }
}

fn orders() -> TableDescriptor {
    table(
        "orders",
        &["id"],
        &[("id", "int8"), ("status", "varchar"), ("total", "numeric"), ("pdf", "bytea")],
    )
}

fn rules() -> ExclusionRules {
    ExclusionRules::new("super_audit_logs", ["Reports"])
}

fn generator() -> TriggerGenerator {
    TriggerGenerator::new(
        QualifiedName::new("public", "super_audit_logs"),
        SessionVariables::default(),
    )
}

fn manager<'a>(executor: &'a RecordingExecutor, catalog: &'a StaticCatalog) -> TriggerManager<'a> {
    TriggerManager::new(executor, catalog, rules(), generator(), "public")
}

#[test]
fn generation_is_byte_identical_across_calls() {
    let Eligibility::Eligible(eligible) = evaluate(&orders(), &rules()) else {
        panic!("orders should be eligible");
    };
    let first = generator().build(&eligible);
    let second = generator().build(&eligible);
    for (a, b) in first.definitions().iter().zip(second.definitions()) {
        assert_eq!(a.function_sql, b.function_sql);
        assert_eq!(a.trigger_sql, b.trigger_sql);
    }
}

#[test]
fn excluded_column_types_never_reach_trigger_bodies() {
    let Eligibility::Eligible(eligible) = evaluate(&orders(), &rules()) else {
        panic!("orders should be eligible");
    };
    let set = generator().build(&eligible);
    for def in set.definitions() {
        assert!(!def.function_sql.contains("pdf"), "{}", def.function_sql);
    }
}

#[test]
fn eligibility_gating() {
    let composite = table("role_user", &["role_id", "user_id"], &[("role_id", "int8"), ("user_id", "int8")]);
    assert!(matches!(
        evaluate(&composite, &rules()),
        Eligibility::Skipped(SkipReason::CompositeKey { .. })
    ));

    let excluded = table("rEpOrTs", &["id"], &[("id", "int8")]);
    assert_eq!(evaluate(&excluded, &rules()), Eligibility::Skipped(SkipReason::Excluded));

    let blobs = table("blobs", &["id"], &[("id", "bytea"), ("data", "bytea")]);
    assert_eq!(evaluate(&blobs, &rules()), Eligibility::Skipped(SkipReason::NoEligibleColumns));
}

#[test]
fn drop_without_existing_triggers_is_a_no_op() {
    let executor = RecordingExecutor::new();
    let catalog = StaticCatalog::new(vec![orders()]);

    let report = manager(&executor, &catalog).drop(None).unwrap();
    assert_eq!(report.dropped, 0);
    assert!(report.failures.is_empty());
    assert_eq!(report.exit_code(), 0);
    assert!(executor
        .statements()
        .iter()
        .all(|s| s.starts_with("DROP FUNCTION IF EXISTS")));
}

#[test]
fn one_failing_table_does_not_abort_the_batch() {
    let executor = RecordingExecutor::new().fail_on("\"after_insert_invoices\"()\nRETURNS");
    let catalog = StaticCatalog::new(vec![
        table("accounts", &["id"], &[("id", "int8"), ("name", "text")]),
        table("invoices", &["id"], &[("id", "int8"), ("total", "numeric")]),
        table("payments", &["id"], &[("id", "uuid"), ("amount", "numeric")]),
    ]);

    let mut seen = Vec::new();
    let report = manager(&executor, &catalog)
        .create_with(None, |t, _| seen.push(t.to_string()))
        .unwrap();

    assert_eq!(seen, vec!["accounts", "invoices", "payments"]);
    assert_eq!(report.get("accounts"), Some(&Outcome::Created));
    assert!(matches!(
        report.get("invoices"),
        Some(Outcome::Failed(FailureReason::DdlExecutionFailed(_)))
    ));
    assert_eq!(report.get("payments"), Some(&Outcome::Created));
    assert_eq!((report.created(), report.skipped(), report.failed()), (2, 0, 1));
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn rebuild_drops_then_creates() {
    let executor = RecordingExecutor::new();
    let catalog = StaticCatalog::new(vec![orders()])
        .with_trigger("orders", "after_insert_orders")
        .with_trigger("orders", "after_update_orders")
        .with_trigger("orders", "after_delete_orders");

    let report = manager(&executor, &catalog).rebuild(None).unwrap();
    assert_eq!(report.dropped.dropped, 3);
    assert_eq!(report.created.get("orders"), Some(&Outcome::Created));
    assert_eq!(report.exit_code(), 0);

    let sql = executor.statements();
    let begin = sql.iter().position(|s| s == "BEGIN").unwrap();
    assert!(sql[..begin].iter().all(|s| s.starts_with("DROP")));
}
