//! # Lifeguard Audit
//!
//! Trigger-based change history for PostgreSQL.
//!
//! The engine reads table metadata from the catalog, decides which tables can be
//! audited, generates `AFTER INSERT/UPDATE/DELETE` row triggers that write into a
//! single audit table, and keeps those triggers current: on demand through
//! [`TriggerManager`], and after schema migrations through
//! [`migration::MigrationRunner`].
//!
//! Triggers stamp each row with the acting user and request URL read from two
//! session settings. Those are written per connection checkout by
//! [`ContextPropagator::bind`]; a pooled connection that skips the bind records
//! whatever the previous request left behind, or nothing once the guard cleared it.
//!
//! ```rust,no_run
//! use lifeguard_audit::{connect, AuditConfig, SchemaCatalog, TriggerManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuditConfig::load()?;
//! let executor = connect(&config.database.url)?;
//! let catalog = SchemaCatalog::postgres(&executor, &config.audit.schema);
//! let manager = TriggerManager::new(
//!     &executor,
//!     &catalog,
//!     config.exclusion_rules(),
//!     config.trigger_generator(),
//!     config.audit.schema.clone(),
//! );
//! let report = manager.create(None)?;
//! std::process::exit(report.exit_code());
//! # }
//! ```

pub mod audit_log;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod context;
pub mod diff;
pub mod eligibility;
pub mod error;
pub mod executor;
pub mod lifecycle;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod migration;
pub mod quote;
pub mod trigger;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use audit_log::{create_audit_table_statements, AuditAction, AuditLogRecord, DEFAULT_AUDIT_TABLE};
pub use catalog::{
    CatalogError, CatalogStrategy, ColumnDescriptor, SchemaCatalog, TableDescriptor, TypeTag,
};
pub use config::AuditConfig;
pub use connection::{connect, ConnectionError};
pub use context::{AuditContext, ContextGuard, ContextPropagator, SessionVariables};
pub use eligibility::{evaluate, Eligibility, EligibleTable, ExclusionRules, SkipReason};
pub use error::AuditError;
pub use executor::{ExecutorError, MayPostgresExecutor, SqlExecutor};
pub use lifecycle::{
    parse_table_list, BatchReport, DropReport, FailureReason, Outcome, Planned, RebuildReport,
    TriggerManager,
};
pub use trigger::{TriggerDefinition, TriggerGenerator, TriggerSet};
