//! SchemaManager - Provides methods for schema operations in migrations

use super::error::MigrationError;
use crate::executor::SqlExecutor;
use may_postgres::types::ToSql;
use sea_query::{
    ColumnDef, IndexCreateStatement, IndexDropStatement, PostgresQueryBuilder, Table,
    TableAlterStatement, TableCreateStatement, TableDropStatement,
};

/// SchemaManager provides methods for performing schema operations in migrations
///
/// Statements are built with sea-query for PostgreSQL and sent through the
/// wrapped executor, which during a migration run is the batch's observing
/// executor.
pub struct SchemaManager<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust,no_run
    /// # use lifeguard_audit::migration::SchemaManager;
    /// # fn run(manager: &SchemaManager<'_>) -> Result<(), lifeguard_audit::migration::MigrationError> {
    /// use sea_query::{Table, ColumnDef};
    ///
    /// let table = Table::create()
    ///     .table("invoices")
    ///     .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
    ///     .col(ColumnDef::new("total").decimal().not_null())
    ///     .to_owned();
    ///
    /// manager.create_table(table)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), MigrationError> {
        self.run(table.build(PostgresQueryBuilder))
    }

    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), MigrationError> {
        self.run(table.build(PostgresQueryBuilder))
    }

    pub fn alter_table(&self, alter: TableAlterStatement) -> Result<(), MigrationError> {
        self.run(alter.build(PostgresQueryBuilder))
    }

    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), MigrationError> {
        self.run(index.build(PostgresQueryBuilder))
    }

    pub fn drop_index(&self, index: IndexDropStatement) -> Result<(), MigrationError> {
        self.run(index.build(PostgresQueryBuilder))
    }

    /// Add a column to an existing table
    pub fn add_column(&self, table: &str, column: ColumnDef) -> Result<(), MigrationError> {
        let alter = Table::alter()
            .table(table.to_string())
            .add_column(column)
            .to_owned();
        self.alter_table(alter)
    }

    pub fn drop_column(&self, table: &str, column: &str) -> Result<(), MigrationError> {
        let alter = Table::alter()
            .table(table.to_string())
            .drop_column(column.to_string())
            .to_owned();
        self.alter_table(alter)
    }

    pub fn rename_column(&self, table: &str, old_name: &str, new_name: &str) -> Result<(), MigrationError> {
        let alter = Table::alter()
            .table(table.to_string())
            .rename_column(old_name.to_string(), new_name.to_string())
            .to_owned();
        self.alter_table(alter)
    }

    /// Execute raw SQL
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<(), MigrationError> {
        self.executor.execute(sql, params)?;
        Ok(())
    }

    pub fn executor(&self) -> &dyn SqlExecutor {
        self.executor
    }

    fn run(&self, sql: String) -> Result<(), MigrationError> {
        // DDL statements carry no parameters
        self.execute(&sql, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;

    #[test]
    fn test_statements_are_built_for_postgres() {
        let executor = RecordingExecutor::new();
        let manager = SchemaManager::new(&executor);

        manager
            .create_table(
                Table::create()
                    .table("invoices")
                    .col(ColumnDef::new("id").big_integer().not_null().primary_key())
                    .to_owned(),
            )
            .unwrap();
        manager
            .add_column("invoices", ColumnDef::new("paid_at").timestamp_with_time_zone().null().to_owned())
            .unwrap();
        manager.rename_column("invoices", "paid_at", "settled_at").unwrap();

        let sql = executor.statements();
        assert!(sql[0].starts_with("CREATE TABLE \"invoices\""));
        assert!(sql[1].starts_with("ALTER TABLE \"invoices\" ADD COLUMN \"paid_at\""));
        assert_eq!(
            sql[2],
            "ALTER TABLE \"invoices\" RENAME COLUMN \"paid_at\" TO \"settled_at\""
        );
    }

    #[test]
    fn test_execution_errors_propagate() {
        let executor = RecordingExecutor::new().fail_on("DROP TABLE");
        let manager = SchemaManager::new(&executor);
        let result = manager.drop_table(Table::drop().table("invoices").to_owned());
        assert!(matches!(result, Err(MigrationError::Database(_))));
    }
}
