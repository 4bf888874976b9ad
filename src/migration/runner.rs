//! MigrationRunner - runs a set of migrations as one trigger-regeneration batch

use super::correlator::{MigrationBatch, ObservedExecutor, TriggerRecreator};
use super::error::MigrationError;
use super::migration::Migration;
use super::schema_manager::SchemaManager;
use crate::executor::SqlExecutor;
use crate::lifecycle::BatchReport;
use std::time::Instant;

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    Up,
    Down,
}

/// Result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Migrations executed, in execution order.
    pub applied: Vec<(i64, String)>,
    /// Tables created or altered by the run.
    pub touched_tables: Vec<String>,
    /// Trigger regeneration outcome, when it ran.
    pub triggers: Option<BatchReport>,
}

/// Executes registered migrations in version order.
///
/// The whole run is one migration batch. When it succeeds and
/// `auto_recreate_triggers` is set, triggers are regenerated for the tables the
/// migrations touched; a regeneration problem is logged and never turns a
/// successful run into an error. When a migration fails, the batch is
/// discarded and the migration error is returned.
pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
    auto_recreate_triggers: bool,
}

impl MigrationRunner {
    pub fn new(auto_recreate_triggers: bool) -> Self {
        Self {
            migrations: Vec::new(),
            auto_recreate_triggers,
        }
    }

    /// Register a migration; versions must be positive and unique.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> Result<(), MigrationError> {
        let version = migration.version();
        if version <= 0 {
            return Err(MigrationError::InvalidVersion(version));
        }
        if let Some(existing) = self.migrations.iter().find(|m| m.version() == version) {
            return Err(MigrationError::DuplicateVersion {
                version,
                existing: existing.name().to_string(),
                name: migration.name().to_string(),
            });
        }
        self.migrations.push(migration);
        self.migrations.sort_by_key(|m| m.version());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Apply every registered migration, oldest first.
    pub fn up(
        &self,
        executor: &dyn SqlExecutor,
        recreator: &dyn TriggerRecreator,
    ) -> Result<RunSummary, MigrationError> {
        self.run(executor, recreator, MigrationDirection::Up)
    }

    /// Roll back every registered migration, newest first.
    pub fn down(
        &self,
        executor: &dyn SqlExecutor,
        recreator: &dyn TriggerRecreator,
    ) -> Result<RunSummary, MigrationError> {
        self.run(executor, recreator, MigrationDirection::Down)
    }

    fn run(
        &self,
        executor: &dyn SqlExecutor,
        recreator: &dyn TriggerRecreator,
        direction: MigrationDirection,
    ) -> Result<RunSummary, MigrationError> {
        let batch = MigrationBatch::start();
        let applied = {
            let observed = ObservedExecutor::new(executor, &batch);
            let manager = SchemaManager::new(&observed);
            self.execute_all(&manager, direction)
        };

        let applied = match applied {
            Ok(applied) => applied,
            Err(e) => {
                batch.discard();
                return Err(e);
            }
        };

        let touched_tables = batch.touched_tables();
        let triggers = if self.auto_recreate_triggers {
            batch.finish(recreator)
        } else {
            batch.discard();
            None
        };

        Ok(RunSummary {
            applied,
            touched_tables,
            triggers,
        })
    }

    fn execute_all(
        &self,
        manager: &SchemaManager<'_>,
        direction: MigrationDirection,
    ) -> Result<Vec<(i64, String)>, MigrationError> {
        let ordered: Vec<&dyn Migration> = match direction {
            MigrationDirection::Up => self.migrations.iter().map(|m| &**m).collect(),
            MigrationDirection::Down => self.migrations.iter().rev().map(|m| &**m).collect(),
        };

        let mut applied = Vec::with_capacity(ordered.len());
        for migration in ordered {
            let start = Instant::now();
            let result = match direction {
                MigrationDirection::Up => migration.up(manager),
                MigrationDirection::Down => migration.down(manager),
            };
            result.map_err(|e| MigrationError::ExecutionFailed {
                version: migration.version(),
                name: migration.name().to_string(),
                error: e.to_string(),
            })?;
            log::info!(
                "Migration {} ({}) {:?} in {:?}",
                migration.name(),
                migration.version(),
                direction,
                start.elapsed()
            );
            applied.push((migration.version(), migration.name().to_string()));
        }
        Ok(applied)
    }
}
