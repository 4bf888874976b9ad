//! Schema catalog reader
//!
//! Introspection is exposed as a capability trait, [`CatalogStrategy`]. A backend can
//! supply one strategy or several; [`SchemaCatalog`] tries them in order and the first
//! success wins, so a metadata API that is unavailable on one server version silently
//! defers to the next strategy.

pub mod information_schema;
pub mod pg_catalog;
pub mod type_tag;

pub use information_schema::InformationSchemaCatalog;
pub use pg_catalog::PgCatalog;
pub use type_tag::TypeTag;

use crate::executor::ExecutorError;
use serde::{Deserialize, Serialize};

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The metadata query itself failed
    #[error("catalog query failed: {0}")]
    Query(#[from] ExecutorError),
    /// The table has no visible columns in the inspected schema
    #[error("table {schema}.{table} not found")]
    TableNotFound { schema: String, table: String },
    /// Every configured strategy failed
    #[error("no catalog strategy could answer: {0}")]
    Exhausted(String),
}

/// One column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Raw type name as reported by the catalog.
    pub data_type: String,
    pub type_tag: TypeTag,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            type_tag: TypeTag::parse(&data_type),
            data_type,
        }
    }
}

/// Catalog facts for one table, produced fresh per introspection call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    /// Primary-key column names in key order.
    pub primary_key_columns: Vec<String>,
    /// Columns in catalog (ordinal) order.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// The primary-key column, only when the key is exactly one column.
    ///
    /// Tables with no key or a composite key return `None`; callers that need to
    /// tell those apart look at `primary_key_columns`.
    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        match self.primary_key_columns.as_slice() {
            [only] => self.columns.iter().find(|c| &c.name == only),
            _ => None,
        }
    }
}

/// A way of reading table metadata from the database.
pub trait CatalogStrategy {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Base tables of the inspected schema, sorted by name.
    fn list_tables(&self) -> Result<Vec<String>, CatalogError>;

    /// Columns and primary key of one table.
    fn describe_table(&self, table: &str) -> Result<TableDescriptor, CatalogError>;

    /// Whether a trigger with this name is attached to the table.
    fn trigger_exists(&self, table: &str, trigger: &str) -> Result<bool, CatalogError>;
}

/// Ordered list of strategies; first success wins.
pub struct SchemaCatalog<'a> {
    strategies: Vec<Box<dyn CatalogStrategy + 'a>>,
}

impl<'a> SchemaCatalog<'a> {
    pub fn new(strategies: Vec<Box<dyn CatalogStrategy + 'a>>) -> Self {
        Self { strategies }
    }

    /// The standard PostgreSQL chain: `information_schema` first, `pg_catalog` as fallback.
    pub fn postgres(executor: &'a dyn crate::SqlExecutor, schema: &str) -> Self {
        Self::new(vec![
            Box::new(InformationSchemaCatalog::new(executor, schema)),
            Box::new(PgCatalog::new(executor, schema)),
        ])
    }

    fn first_success<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut(&dyn CatalogStrategy) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match attempt(strategy.as_ref()) {
                Ok(value) => return Ok(value),
                Err(err @ CatalogError::TableNotFound { .. }) => return Err(err),
                Err(err) => {
                    log::debug!(
                        "Catalog strategy '{}' failed for {}: {}; trying next",
                        strategy.name(),
                        operation,
                        err
                    );
                    failures.push(format!("{}: {}", strategy.name(), err));
                }
            }
        }
        Err(CatalogError::Exhausted(if failures.is_empty() {
            "no strategies configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

impl CatalogStrategy for SchemaCatalog<'_> {
    fn name(&self) -> &str {
        "chain"
    }

    fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
        self.first_success("list_tables", |s| s.list_tables())
    }

    fn describe_table(&self, table: &str) -> Result<TableDescriptor, CatalogError> {
        self.first_success(table, |s| s.describe_table(table))
    }

    fn trigger_exists(&self, table: &str, trigger: &str) -> Result<bool, CatalogError> {
        self.first_success(trigger, |s| s.trigger_exists(table, trigger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StaticCatalog;

    struct Unavailable;

    impl CatalogStrategy for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
            Err(CatalogError::Query(ExecutorError::Query("permission denied".into())))
        }

        fn describe_table(&self, _table: &str) -> Result<TableDescriptor, CatalogError> {
            Err(CatalogError::Query(ExecutorError::Query("permission denied".into())))
        }

        fn trigger_exists(&self, _table: &str, _trigger: &str) -> Result<bool, CatalogError> {
            Err(CatalogError::Query(ExecutorError::Query("permission denied".into())))
        }
    }

    fn users() -> TableDescriptor {
        TableDescriptor {
            schema: "public".into(),
            name: "users".into(),
            primary_key_columns: vec!["id".into()],
            columns: vec![
                ColumnDescriptor::new("id", "int8"),
                ColumnDescriptor::new("email", "varchar"),
            ],
        }
    }

    #[test]
    fn test_primary_key_requires_exactly_one_column() {
        let mut table = users();
        assert_eq!(table.primary_key().map(|c| c.name.as_str()), Some("id"));

        table.primary_key_columns = vec![];
        assert!(table.primary_key().is_none());

        table.primary_key_columns = vec!["id".into(), "email".into()];
        assert!(table.primary_key().is_none());
    }

    #[test]
    fn test_chain_falls_back_to_next_strategy() {
        let catalog = SchemaCatalog::new(vec![
            Box::new(Unavailable),
            Box::new(StaticCatalog::new(vec![users()])),
        ]);

        assert_eq!(catalog.list_tables().unwrap(), vec!["users".to_string()]);
        assert_eq!(catalog.describe_table("users").unwrap().columns.len(), 2);
    }

    #[test]
    fn test_chain_reports_exhaustion() {
        let catalog = SchemaCatalog::new(vec![Box::new(Unavailable)]);
        let err = catalog.list_tables().unwrap_err();
        assert!(matches!(err, CatalogError::Exhausted(_)));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_missing_table_is_not_retried() {
        let catalog = SchemaCatalog::new(vec![
            Box::new(StaticCatalog::new(vec![])),
            Box::new(StaticCatalog::new(vec![users()])),
        ]);
        assert!(matches!(
            catalog.describe_table("users"),
            Err(CatalogError::TableNotFound { .. })
        ));
    }
}
