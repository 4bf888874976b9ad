//! The audit log table: row shape and DDL.
//!
//! Triggers write rows into this table; nothing in this crate reads them back
//! for reporting. The DDL is built with sea-query so the table can be installed
//! from the CLI or from a migration.

use chrono::{DateTime, Utc};
use sea_query::{Alias, ColumnDef, Expr, Index, PostgresQueryBuilder, Table};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default audit table name.
pub const DEFAULT_AUDIT_TABLE: &str = "super_audit_logs";

/// Row-level event captured by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
}

impl AuditAction {
    pub const ALL: [AuditAction; 3] = [AuditAction::Insert, AuditAction::Update, AuditAction::Delete];

    /// Value stored in the `action` column.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Insert => "insert",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }

    /// Trigger event keyword.
    pub fn event(self) -> &'static str {
        match self {
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit log row.
///
/// `old_data` / `new_data` follow the action: insert has only `new_data`, delete
/// only `old_data`, update both, holding just the columns that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: Option<i64>,
    pub table_name: String,
    pub record_id: String,
    pub action: AuditAction,
    pub user_id: Option<i64>,
    pub url: Option<String>,
    pub old_data: Option<Map<String, Value>>,
    pub new_data: Option<Map<String, Value>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// `CREATE TABLE` and `CREATE INDEX` statements for the audit table, all idempotent.
pub fn create_audit_table_statements(schema: &str, table: &str) -> Vec<String> {
    let table_ref = (Alias::new(schema), Alias::new(table));

    let create = Table::create()
        .table(table_ref.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new("id"))
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Alias::new("table_name")).string().not_null())
        .col(ColumnDef::new(Alias::new("record_id")).string().not_null())
        .col(ColumnDef::new(Alias::new("action")).string().not_null())
        .col(ColumnDef::new(Alias::new("user_id")).big_integer().null())
        .col(ColumnDef::new(Alias::new("url")).text().null())
        .col(ColumnDef::new(Alias::new("old_data")).json_binary().null())
        .col(ColumnDef::new(Alias::new("new_data")).json_binary().null())
        .col(
            ColumnDef::new(Alias::new("created_at"))
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();

    let mut statements = vec![create.build(PostgresQueryBuilder)];

    let indexes: [&[&str]; 6] = [
        &["table_name"],
        &["record_id"],
        &["user_id"],
        &["table_name", "record_id"],
        &["table_name", "action"],
        &["user_id", "created_at"],
    ];
    for columns in indexes {
        let mut index = Index::create();
        index
            .name(format!("idx_{}_{}", table, columns.join("_")))
            .table(table_ref.clone())
            .if_not_exists();
        for column in columns {
            index.col(Alias::new(*column));
        }
        statements.push(index.to_owned().build(PostgresQueryBuilder));
    }

    statements
}
