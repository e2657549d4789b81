//! Schema migration phase.
//!
//! Two backends share one report shape: the framework backend drives the
//! application's own `makemigrations`/`migrate` commands, and the SQL ledger
//! backend applies `*.sql` descriptors in dependency order against a SQLite
//! store, recording each one in a ledger table so re-runs skip it.

pub mod descriptor_graph;
pub mod framework;
pub mod sql_ledger;

use serde::Serialize;

pub use descriptor_graph::{
    load_descriptors, order_descriptors, parse_descriptor_header, DescriptorGraphError,
    SchemaDescriptor,
};
pub use framework::{parse_applied_migrations, run_framework_migrations};
pub use sql_ledger::{SqlLedger, LEDGER_TABLE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub backend: &'static str,
    /// Descriptors applied by this run, in application order.
    pub applied: Vec<String>,
    pub already_applied: usize,
    pub commands: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}
