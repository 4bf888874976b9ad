//! Catalog strategy over the raw `pg_catalog` relations.

use super::{CatalogError, CatalogStrategy, ColumnDescriptor, TableDescriptor};
use crate::executor::{bool_column, text_column, SqlExecutor};

const LIST_TABLES_SQL: &str = r#"
    SELECT c.relname::text
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'p')
      -- Partitions inherit their parent's row triggers.
      AND NOT c.relispartition
    ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
    SELECT a.attname::text, COALESCE(bt.typname, t.typname)::text
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
    -- Domains report their base type, as information_schema.columns.udt_name does.
    LEFT JOIN pg_catalog.pg_type bt ON t.typtype = 'd' AND bt.oid = t.typbasetype
    WHERE n.nspname = $1
      AND c.relname = $2
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

const PRIMARY_KEY_SQL: &str = r#"
    SELECT a.attname::text
    FROM pg_catalog.pg_index i
    JOIN pg_catalog.pg_class c ON c.oid = i.indrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY (i.indkey)
    WHERE n.nspname = $1
      AND c.relname = $2
      AND i.indisprimary
    ORDER BY array_position(i.indkey::int2[], a.attnum)
"#;

const TRIGGER_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1
        FROM pg_catalog.pg_trigger t
        JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relname = $2
          AND t.tgname = $3
          AND NOT t.tgisinternal
    )
"#;

/// Reads metadata straight from `pg_catalog`.
pub struct PgCatalog<'a> {
    executor: &'a dyn SqlExecutor,
    schema: String,
}

impl<'a> PgCatalog<'a> {
    pub fn new(executor: &'a dyn SqlExecutor, schema: impl Into<String>) -> Self {
        Self {
            executor,
            schema: schema.into(),
        }
    }
}

impl CatalogStrategy for PgCatalog<'_> {
    fn name(&self) -> &str {
        "pg_catalog"
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
