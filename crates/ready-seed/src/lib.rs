//! Seed data phase.
//!
//! Baseline reference records (the immunization schedule and developmental
//! milestones) are inserted only when their natural key is absent, so the
//! phase can be repeated without duplicating rows.

pub mod catalog;
pub mod framework;
pub mod native;

use serde::Serialize;

pub use catalog::{load_catalog, MilestoneEntry, SeedCatalog, VaccineEntry, MILESTONE_CATEGORIES};
pub use framework::run_framework_seed;
pub use native::{NativeSeeder, MILESTONE_TABLE, VACCINE_TABLE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedTableReport {
    pub table: String,
    pub inserted: usize,
    pub already_present: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub backend: &'static str,
    pub tables: Vec<SeedTableReport>,
    pub commands: Vec<String>,
    /// Set when the phase decided not to touch the store.
    pub skipped: Option<String>,
}

impl SeedReport {
    pub fn inserted(&self) -> usize {
        self.tables.iter().map(|table| table.inserted).sum()
    }

    pub fn already_present(&self) -> usize {
        self.tables.iter().map(|table| table.already_present).sum()
    }
}
