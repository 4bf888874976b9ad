//! Migration support with automatic trigger regeneration
//!
//! Migrations are written against [`SchemaManager`] and run by
//! [`MigrationRunner`]. Every statement a run issues is observed; tables it
//! creates or alters get their audit triggers regenerated once the run
//! succeeds.
//!
//! # Example
//!
//! ```rust,no_run
//! use lifeguard_audit::migration::{Migration, MigrationError, SchemaManager};
//! use sea_query::{Table, ColumnDef};
//!
//! pub struct CreateInvoicesTable;
//!
//! impl Migration for CreateInvoicesTable {
//!     fn name(&self) -> &str {
//!         "create_invoices_table"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20240120120000
//!     }
//!
//!     fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         let table = Table::create()
//!             .table("invoices")
//!             .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
//!             .col(ColumnDef::new("total").decimal().not_null())
//!             .to_owned();
//!         manager.create_table(table)
//!     }
//!
//!     fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
//!         manager.drop_table(Table::drop().table("invoices").to_owned())
//!     }
//! }
//! ```

pub mod correlator;
pub mod error;
pub mod migration;
pub mod runner;
pub mod schema_manager;

pub use correlator::{extract_table_targets, MigrationBatch, ObservedExecutor, TriggerRecreator};
pub use error::MigrationError;
pub use migration::Migration;
pub use runner::{MigrationDirection, MigrationRunner, RunSummary};
pub use schema_manager::SchemaManager;
