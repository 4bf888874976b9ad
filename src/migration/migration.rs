//! Migration trait definition

use super::error::MigrationError;
use super::schema_manager::SchemaManager;

/// Trait that all migrations must implement
///
/// Statements issued through the [`SchemaManager`] are observed by the running
/// batch, so tables created or altered here get their audit triggers regenerated
/// once the batch completes.
pub trait Migration: Send + Sync {
    /// Get the migration name (human-readable identifier)
    fn name(&self) -> &str;

    /// Get the migration version (timestamp: YYYYMMDDHHMMSS)
    fn version(&self) -> i64;

    /// Apply the migration (forward migration)
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;

    /// Rollback the migration (reverse migration)
    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError>;
}
