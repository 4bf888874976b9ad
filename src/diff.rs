//! In-process model of what the generated triggers record.
//!
//! The triggers compute their payloads inside the database. [`RowDiff`] and the
//! record builders compute the same payloads from `serde_json` rows, using the
//! same rules: values compare as JSON, so `null`/`null` is unchanged and
//! `null`/value is a change.

use crate::audit_log::{AuditAction, AuditLogRecord};
use serde_json::{Map, Value};

/// Changed columns of one update, old and new values side by side.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDiff {
    pub old_data: Map<String, Value>,
    pub new_data: Map<String, Value>,
}

impl RowDiff {
    /// Diff two row images over `columns`, in column order.
    ///
    /// Columns missing from a row are read as `null`. Returns `None` when no
    /// column changed; the update trigger writes nothing in that case.
    pub fn between<'c>(
        old: &Map<String, Value>,
        new: &Map<String, Value>,
        columns: impl IntoIterator<Item = &'c str>,
    ) -> Option<Self> {
        let mut diff = Self {
            old_data: Map::new(),
            new_data: Map::new(),
        };
        for column in columns {
            let before = old.get(column).unwrap_or(&Value::Null);
            let after = new.get(column).unwrap_or(&Value::Null);
            if before != after {
                diff.old_data.insert(column.to_string(), before.clone());
                diff.new_data.insert(column.to_string(), after.clone());
            }
        }
        if diff.old_data.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    pub fn changed_columns(&self) -> impl Iterator<Item = &str> {
        self.old_data.keys().map(String::as_str)
    }
}

fn project<'c>(row: &Map<String, Value>, columns: impl IntoIterator<Item = &'c str>) -> Map<String, Value> {
    columns
        .into_iter()
        .map(|c| (c.to_string(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

fn record_id(row: &Map<String, Value>, primary_key: &str) -> String {
    match row.get(primary_key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn record(table: &str, record_id: String, action: AuditAction) -> AuditLogRecord {
    AuditLogRecord {
        id: None,
        table_name: table.to_string(),
        record_id,
        action,
        user_id: None,
        url: None,
        old_data: None,
        new_data: None,
        created_at: None,
    }
}

/// Record an insert trigger writes for `row`.
pub fn insert_record<'c>(
    table: &str,
    primary_key: &str,
    columns: impl IntoIterator<Item = &'c str>,
    row: &Map<String, Value>,
) -> AuditLogRecord {
    let mut rec = record(table, record_id(row, primary_key), AuditAction::Insert);
    rec.new_data = Some(project(row, columns));
    rec
}

/// Record an update trigger writes, or `None` for a no-op update.
pub fn update_record<'c>(
    table: &str,
    primary_key: &str,
    columns: impl IntoIterator<Item = &'c str>,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
) -> Option<AuditLogRecord> {
    let diff = RowDiff::between(old, new, columns)?;
    let mut rec = record(table, record_id(new, primary_key), AuditAction::Update);
    rec.old_data = Some(diff.old_data);
    rec.new_data = Some(diff.new_data);
    Some(rec)
}

/// Record a delete trigger writes for `row`.
pub fn delete_record<'c>(
    table: &str,
    primary_key: &str,
    columns: impl IntoIterator<Item = &'c str>,
    row: &Map<String, Value>,
) -> AuditLogRecord {
    let mut rec = record(table, record_id(row, primary_key), AuditAction::Delete);
    rec.old_data = Some(project(row, columns));
    rec
}
