//! PL/pgSQL generation for the insert, update and delete audit triggers.
//!
//! Output depends only on the [`EligibleTable`] and the generator's settings, so
//! regenerating for an unchanged table yields byte-identical SQL.

use super::{trigger_name, TriggerDefinition, TriggerSet};
use crate::audit_log::AuditAction;
use crate::context::SessionVariables;
use crate::eligibility::EligibleTable;
use crate::quote::{dollar_quote, quote_ident, quote_literal, QualifiedName};
use std::fmt::Write;

/// `jsonb_build_object` takes at most 100 arguments, i.e. 50 key/value pairs.
const MAX_PAIRS_PER_OBJECT: usize = 50;

/// Row reference inside a trigger body.
#[derive(Debug, Clone, Copy)]
enum RowVar {
    Old,
    New,
}

impl RowVar {
    fn as_str(self) -> &'static str {
        match self {
            RowVar::Old => "OLD",
            RowVar::New => "NEW",
        }
    }
}

/// Builds trigger definitions that write into one audit table.
#[derive(Debug, Clone)]
pub struct TriggerGenerator {
    audit_table: QualifiedName,
    variables: SessionVariables,
}

impl TriggerGenerator {
    pub fn new(audit_table: QualifiedName, variables: SessionVariables) -> Self {
        Self {
            audit_table,
            variables,
        }
    }

    pub fn audit_table(&self) -> &QualifiedName {
        &self.audit_table
    }

    /// All three triggers for `table`.
    pub fn build(&self, table: &EligibleTable) -> TriggerSet {
        TriggerSet {
            table: QualifiedName::new(table.schema.clone(), table.name.clone()),
            insert: self.build_insert_trigger(table),
            update: self.build_update_trigger(table),
            delete: self.build_delete_trigger(table),
        }
    }

    /// Records every eligible column of the inserted row as `new_data`.
    pub fn build_insert_trigger(&self, table: &EligibleTable) -> TriggerDefinition {
        let mut body = String::from("BEGIN\n");
        body.push_str(&self.insert_statement(
            table,
            AuditAction::Insert,
            RowVar::New,
            "NULL",
            &row_object(table, RowVar::New),
        ));
        body.push_str("    RETURN NULL;\nEND;\n");
        self.definition(table, AuditAction::Insert, &body)
    }

    /// Records only the changed columns, and nothing at all for a no-op update.
    pub fn build_update_trigger(&self, table: &EligibleTable) -> TriggerDefinition {
        let mut body = String::new();
        body.push_str("DECLARE\n");
        let _ = writeln!(body, "    v_old_row jsonb := {};", row_object(table, RowVar::Old));
        let _ = writeln!(body, "    v_new_row jsonb := {};", row_object(table, RowVar::New));
        body.push_str("    v_old_data jsonb := '{}'::jsonb;\n");
        body.push_str("    v_new_data jsonb := '{}'::jsonb;\n");
        body.push_str("BEGIN\n");
        body.push_str("    IF v_old_row = v_new_row THEN\n        RETURN NULL;\n    END IF;\n\n");

        // Values inside the row objects are jsonb, so SQL NULL is JSON null and
        // IS DISTINCT FROM treats null/null as equal and null/value as changed.
        for column in table.column_names() {
            let key = quote_literal(column);
            let _ = writeln!(
                body,
                "    IF v_old_row -> {key} IS DISTINCT FROM v_new_row -> {key} THEN"
            );
            let _ = writeln!(
                body,
                "        v_old_data := v_old_data || jsonb_build_object({key}, v_old_row -> {key});"
            );
            let _ = writeln!(
                body,
                "        v_new_data := v_new_data || jsonb_build_object({key}, v_new_row -> {key});"
            );
            body.push_str("    END IF;\n");
        }

        body.push_str("\n    IF v_old_data = '{}'::jsonb THEN\n        RETURN NULL;\n    END IF;\n\n");
        body.push_str(&self.insert_statement(
            table,
            AuditAction::Update,
            RowVar::New,
            "v_old_data",
            "v_new_data",
        ));
        body.push_str("    RETURN NULL;\nEND;\n");
        self.definition(table, AuditAction::Update, &body)
    }

    /// Records every eligible column of the deleted row as `old_data`.
    pub fn build_delete_trigger(&self, table: &EligibleTable) -> TriggerDefinition {
        let mut body = String::from("BEGIN\n");
        body.push_str(&self.insert_statement(
            table,
            AuditAction::Delete,
            RowVar::Old,
            &row_object(table, RowVar::Old),
            "NULL",
        ));
        body.push_str("    RETURN NULL;\nEND;\n");
        self.definition(table, AuditAction::Delete, &body)
    }

    fn definition(&self, table: &EligibleTable, action: AuditAction, body: &str) -> TriggerDefinition {
        let name = trigger_name(action, &table.name);
        let function = QualifiedName::new(table.schema.clone(), name.clone());
        let relation = QualifiedName::new(table.schema.clone(), table.name.clone());

        let function_sql = format!(
            "CREATE OR REPLACE FUNCTION {function}()\nRETURNS trigger\nLANGUAGE plpgsql\nAS {}",
            dollar_quote(body)
        );
        let trigger_sql = format!(
            "CREATE TRIGGER {} AFTER {} ON {relation} FOR EACH ROW EXECUTE FUNCTION {function}()",
            quote_ident(&name),
            action.event(),
        );

        TriggerDefinition {
            action,
            name,
            function_sql,
            trigger_sql,
        }
    }

    fn insert_statement(
        &self,
        table: &EligibleTable,
        action: AuditAction,
        key_row: RowVar,
        old_data: &str,
        new_data: &str,
    ) -> String {
        format!(
            "    INSERT INTO {audit} (table_name, record_id, action, user_id, url, old_data, new_data, created_at)\n\
             \x20   VALUES (\n\
             \x20       {table_name},\n\
             \x20       {row}.{pk}::text,\n\
             \x20       {action},\n\
             \x20       NULLIF(current_setting({user_var}, true), '')::bigint,\n\
             \x20       NULLIF(current_setting({url_var}, true), ''),\n\
             \x20       {old_data},\n\
             \x20       {new_data},\n\
             \x20       statement_timestamp()\n\
             \x20   );\n",
            audit = self.audit_table,
            table_name = quote_literal(&table.name),
            row = key_row.as_str(),
            pk = quote_ident(&table.primary_key.name),
            action = quote_literal(action.as_str()),
            user_var = quote_literal(&self.variables.user_id()),
            url_var = quote_literal(&self.variables.url()),
        )
    }
}

/// `jsonb_build_object('a', NEW."a", ...)`, chained with `||` past 50 columns.
fn row_object(table: &EligibleTable, row: RowVar) -> String {
    let columns: Vec<&str> = table.column_names().collect();
    columns
        .chunks(MAX_PAIRS_PER_OBJECT)
        .map(|chunk| {
            let pairs: Vec<String> = chunk
                .iter()
                .map(|c| format!("{}, {}.{}", quote_literal(c), row.as_str(), quote_ident(c)))
                .collect();
            format!("jsonb_build_object({})", pairs.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" || ")
}
