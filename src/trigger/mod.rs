//! Trigger definitions and the deterministic naming scheme.
//!
//! Each audited table gets three row-level `AFTER` triggers named
//! `after_<action>_<table>`. The PL/pgSQL function behind each trigger carries the
//! same name in the table's schema, so dropping by name removes both halves.

pub mod generator;

pub use generator::TriggerGenerator;

use crate::audit_log::AuditAction;
use crate::quote::{quote_ident, QualifiedName};

/// Deterministic trigger (and trigger function) name.
pub fn trigger_name(action: AuditAction, table: &str) -> String {
    format!("after_{}_{}", action.as_str(), table)
}

/// `DROP ... IF EXISTS` statements for one action's trigger and function.
///
/// The trigger statement names its table, so callers only run it when the
/// table exists; the function statement is safe either way.
pub fn drop_statements(table: &QualifiedName, action: AuditAction) -> [String; 2] {
    let name = trigger_name(action, &table.name);
    let function = QualifiedName::new(table.schema.clone(), name.clone());
    [
        format!("DROP TRIGGER IF EXISTS {} ON {}", quote_ident(&name), table),
        format!("DROP FUNCTION IF EXISTS {}()", function),
    ]
}

/// One generated trigger: its function and the trigger binding it to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDefinition {
    pub action: AuditAction,
    pub name: String,
    pub function_sql: String,
    pub trigger_sql: String,
}

impl TriggerDefinition {
    /// Statements in execution order: function first, then trigger.
    pub fn statements(&self) -> [&str; 2] {
        [&self.function_sql, &self.trigger_sql]
    }
}

/// The three triggers for one table, generated fresh on every create or rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSet {
    pub table: QualifiedName,
    pub insert: TriggerDefinition,
    pub update: TriggerDefinition,
    pub delete: TriggerDefinition,
}

impl TriggerSet {
    pub fn definitions(&self) -> [&TriggerDefinition; 3] {
        [&self.insert, &self.update, &self.delete]
    }

    /// Drop statements for all three actions, in action order.
    pub fn drop_statements(&self) -> Vec<String> {
        AuditAction::ALL
            .iter()
            .flat_map(|action| drop_statements(&self.table, *action))
            .collect()
    }

    /// Create statements for all three actions, in action order.
    pub fn create_statements(&self) -> Vec<&str> {
        self.definitions()
            .into_iter()
            .flat_map(TriggerDefinition::statements)
            .collect()
    }

    /// Full drop-then-create script, `;`-terminated, for review or manual apply.
    pub fn to_script(&self) -> String {
        let mut script = String::new();
        for statement in self.drop_statements() {
            script.push_str(&statement);
            script.push_str(";\n");
        }
        for statement in self.create_statements() {
            script.push('\n');
            script.push_str(statement);
            script.push_str(";\n");
        }
        script
    }
}
