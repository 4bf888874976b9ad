//! Eligibility filter: decides which tables and columns get audit triggers.

use crate::catalog::{ColumnDescriptor, TableDescriptor};
use std::collections::BTreeSet;
use std::fmt;

/// Tables that are never audited, regardless of configuration.
///
/// The configured audit table is added on top of these by [`ExclusionRules::new`].
pub const BUILTIN_EXCLUDED_TABLES: &[&str] = &[
    "migrations",
    "lifeguard_migrations",
    "password_resets",
    "password_reset_tokens",
    "sessions",
    "cache",
    "cache_locks",
    "jobs",
    "job_batches",
    "failed_jobs",
    "personal_access_tokens",
];

/// Case-insensitive set of excluded table names.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    names: BTreeSet<String>,
}

impl ExclusionRules {
    /// Built-ins, the audit table itself, and the caller's list.
    pub fn new<I, S>(audit_table: &str, configured: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::default();
        rules.add(audit_table);
        for name in BUILTIN_EXCLUDED_TABLES {
            rules.add(name);
        }
        for name in configured {
            rules.add(name.as_ref());
        }
        rules
    }

    fn add(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.names.insert(name.to_lowercase());
        }
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.names.contains(&table.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// A table that passed every check, with the columns its triggers capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleTable {
    pub schema: String,
    pub name: String,
    pub primary_key: ColumnDescriptor,
    /// Eligible columns in catalog order.
    pub columns: Vec<ColumnDescriptor>,
}

impl EligibleTable {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Why a table was not given triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    NoPrimaryKey,
    CompositeKey { columns: Vec<String> },
    UnsupportedKeyType { column: String, data_type: String },
    NoEligibleColumns,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Excluded => write!(f, "excluded"),
            SkipReason::NoPrimaryKey => write!(f, "no primary key"),
            SkipReason::CompositeKey { columns } => {
                write!(f, "composite primary key ({})", columns.join(", "))
            }
            SkipReason::UnsupportedKeyType { column, data_type } => {
                write!(f, "primary key {column} has unsupported type {data_type}")
            }
            SkipReason::NoEligibleColumns => write!(f, "no suitable columns"),
        }
    }
}

/// Outcome of the eligibility checks for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible(EligibleTable),
    Skipped(SkipReason),
}

/// Run the checks in order: name exclusion, key shape, column types, key type.
pub fn evaluate(table: &TableDescriptor, rules: &ExclusionRules) -> Eligibility {
    if rules.is_excluded(&table.name) {
        return Eligibility::Skipped(SkipReason::Excluded);
    }

    match table.primary_key_columns.len() {
        0 => return Eligibility::Skipped(SkipReason::NoPrimaryKey),
        1 => {}
        _ => {
            return Eligibility::Skipped(SkipReason::CompositeKey {
                columns: table.primary_key_columns.clone(),
            })
        }
    }

    // A key column the catalog did not list alongside the other columns is
    // treated as missing rather than guessed at.
    let Some(primary_key) = table.primary_key() else {
        return Eligibility::Skipped(SkipReason::NoPrimaryKey);
    };

    let columns: Vec<ColumnDescriptor> = table
        .columns
        .iter()
        .filter(|c| !c.type_tag.is_excluded())
        .cloned()
        .collect();

    // A table made only of excluded types reports NoEligibleColumns, not the key type.
    if columns.is_empty() {
        return Eligibility::Skipped(SkipReason::NoEligibleColumns);
    }

    if primary_key.type_tag.is_excluded() {
        return Eligibility::Skipped(SkipReason::UnsupportedKeyType {
            column: primary_key.name.clone(),
            data_type: primary_key.data_type.clone(),
        });
    }

    Eligibility::Eligible(EligibleTable {
        schema: table.schema.clone(),
        name: table.name.clone(),
        primary_key: primary_key.clone(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn rules() -> ExclusionRules {
        ExclusionRules::new("super_audit_logs", ["Reports"])
    }

    #[test]
    fn test_exclusion_is_case_insensitive() {
        let rules = rules();
        assert!(rules.is_excluded("super_audit_logs"));
        assert!(rules.is_excluded("SUPER_AUDIT_LOGS"));
        assert!(rules.is_excluded("Sessions"));
        assert!(rules.is_excluded("reports"));
        assert!(rules.is_excluded("REPORTS"));
        assert!(!rules.is_excluded("users"));
    }

    #[test]
    fn test_excluded_table_is_skipped_before_key_checks() {
        let t = table("FAILED_JOBS", &[], &[("payload", "text")]);
        assert_eq!(evaluate(&t, &rules()), Eligibility::Skipped(SkipReason::Excluded));
    }

    #[test]
    fn test_key_shape_checks() {
        let no_key = table("events", &[], &[("name", "text")]);
        assert_eq!(evaluate(&no_key, &rules()), Eligibility::Skipped(SkipReason::NoPrimaryKey));

        let composite = table(
            "role_user",
            &["role_id", "user_id"],
            &[("role_id", "int8"), ("user_id", "int8")],
        );
        assert_eq!(
            evaluate(&composite, &rules()),
            Eligibility::Skipped(SkipReason::CompositeKey {
                columns: vec!["role_id".into(), "user_id".into()]
            })
        );
    }

    #[test]
    fn test_binary_primary_key_is_unsupported() {
        let t = table("blobs", &["hash"], &[("hash", "bytea"), ("label", "text")]);
        assert_eq!(
            evaluate(&t, &rules()),
            Eligibility::Skipped(SkipReason::UnsupportedKeyType {
                column: "hash".into(),
                data_type: "bytea".into()
            })
        );
    }

    #[test]
    fn test_only_excluded_columns_yields_no_eligible_columns() {
        let t = table(
            "attachments",
            &["digest"],
            &[("digest", "bytea"), ("body", "longblob"), ("preview", "_bytea")],
        );
        assert_eq!(evaluate(&t, &rules()), Eligibility::Skipped(SkipReason::NoEligibleColumns));
    }

    #[test]
    fn test_eligible_table_keeps_catalog_order_and_drops_excluded_types() {
        let t = table(
            "documents",
            &["id"],
            &[
                ("id", "int8"),
                ("title", "varchar"),
                ("scan", "bytea"),
                ("location", "point"),
                ("meta", "jsonb"),
            ],
        );

        let Eligibility::Eligible(eligible) = evaluate(&t, &rules()) else {
            panic!("documents should be eligible");
        };
        assert_eq!(eligible.primary_key.name, "id");
        assert_eq!(
            eligible.column_names().collect::<Vec<_>>(),
            vec!["id", "title", "meta"]
        );
    }
}
