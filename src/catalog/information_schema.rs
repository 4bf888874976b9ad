//! Catalog strategy over the SQL-standard `information_schema` views.

use super::{CatalogError, CatalogStrategy, ColumnDescriptor, TableDescriptor};
use crate::executor::{bool_column, text_column, SqlExecutor};

const LIST_TABLES_SQL: &str = r#"
    SELECT t.table_name::text
    FROM information_schema.tables t
    WHERE t.table_schema = $1
      AND t.table_type = 'BASE TABLE'
      -- Partitions inherit their parent's row triggers.
      AND NOT EXISTS (
          SELECT 1
          FROM pg_catalog.pg_class c
          JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
          WHERE n.nspname::text = t.table_schema::text
            AND c.relname::text = t.table_name::text
            AND c.relispartition
      )
    ORDER BY t.table_name
"#;

const COLUMNS_SQL: &str = r#"
    SELECT column_name::text, udt_name::text
    FROM information_schema.columns
    WHERE table_schema = $1
      AND table_name = $2
    ORDER BY ordinal_position
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = tc.constraint_schema
     AND kcu.constraint_name = tc.constraint_name
     AND kcu.table_name = tc.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
      AND tc.table_schema = $1
      AND tc.table_name = $2
    ORDER BY kcu.ordinal_position
"#;

const TRIGGER_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1
        FROM information_schema.triggers
        WHERE event_object_schema = $1
          AND event_object_table = $2
          AND trigger_name = $3
    )
"#;

/// Reads metadata through `information_schema`.
///
/// Only objects the current role has privileges on are visible here. When the
/// views themselves cannot be queried, the default chain falls back to
/// [`super::PgCatalog`].
pub struct InformationSchemaCatalog<'a> {
    executor: &'a dyn SqlExecutor,
    schema: String,
}

impl<'a> InformationSchemaCatalog<'a> {
    pub fn new(executor: &'a dyn SqlExecutor, schema: impl Into<String>) -> Self {
        Self {
            executor,
            schema: schema.into(),
        }
    }
}

impl CatalogStrategy for InformationSchemaCatalog<'_> {
    fn name(&self) -> &str {
        "information_schema"
    }

    fn list_tables(&self) -> Result<Vec<String>, CatalogError> {
        let rows = self.executor.query_all(LIST_TABLES_SQL, &[&self.schema])?;
        rows.iter()
            .map(|row| text_column(row, 0).map_err(CatalogError::from))
            .collect()
    }

    fn describe_table(&self, table: &str) -> Result<TableDescriptor, CatalogError> {
        let table_name = table.to_string();

        let columns = self
            .executor
            .query_all(COLUMNS_SQL, &[&self.schema, &table_name])?
            .iter()
            .map(|row| -> Result<ColumnDescriptor, CatalogError> {
                Ok(ColumnDescriptor::new(text_column(row, 0)?, text_column(row, 1)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(CatalogError::TableNotFound {
                schema: self.schema.clone(),
                table: table_name,
            });
        }

        let primary_key_columns = self
            .executor
            .query_all(PRIMARY_KEY_SQL, &[&self.schema, &table_name])?
            .iter()
            .map(|row| text_column(row, 0).map_err(CatalogError::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TableDescriptor {
            schema: self.schema.clone(),
            name: table_name,
            primary_key_columns,
            columns,
        })
    }

    fn trigger_exists(&self, table: &str, trigger: &str) -> Result<bool, CatalogError> {
        let table = table.to_string();
        let trigger = trigger.to_string();
        let rows = self
            .executor
            .query_all(TRIGGER_EXISTS_SQL, &[&self.schema, &table, &trigger])?;
        match rows.first() {
            Some(row) => Ok(bool_column(row, 0)?),
            None => Ok(false),
        }
    }
}
