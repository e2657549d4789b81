//! Keyed seeding straight into the application's SQLite store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Transaction};

use crate::catalog::SeedCatalog;
use crate::{SeedReport, SeedTableReport};

pub const VACCINE_TABLE: &str = "child_tracker_vaccineschedule";
pub const MILESTONE_TABLE: &str = "child_tracker_milestone";

#[derive(Debug, Clone)]
pub struct NativeSeeder {
    db_path: PathBuf,
}

impl NativeSeeder {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn open_connection(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let connection = Connection::open(&self.db_path)
            .with_context(|| format!("failed to open store {}", self.db_path.display()))?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        // Column layout matches what the framework generates for these models, so
        // either side may create the tables first.
        connection.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {VACCINE_TABLE} (
                id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
                vaccine_name VARCHAR(100) NOT NULL,
                description TEXT NOT NULL,
                age_in_months INTEGER UNSIGNED NOT NULL CHECK (age_in_months >= 0),
                dose_number INTEGER UNSIGNED NOT NULL CHECK (dose_number >= 0),
                is_mandatory BOOL NOT NULL,
                protects_against VARCHAR(200) NOT NULL,
                side_effects TEXT NOT NULL,
                notes TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {MILESTONE_TABLE} (
                id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
                category VARCHAR(20) NOT NULL,
                title VARCHAR(200) NOT NULL,
                description TEXT NOT NULL,
                typical_age_months INTEGER UNSIGNED NOT NULL CHECK (typical_age_months >= 0)
            );
            "#
        ))?;
        Ok(connection)
    }

    /// Inserts every catalog record whose natural key is not yet stored.
    pub fn seed(&self, catalog: &SeedCatalog) -> Result<SeedReport> {
        catalog.validate()?;
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let vaccines = seed_vaccines(&transaction, catalog)?;
        let milestones = seed_milestones(&transaction, catalog)?;
        transaction
            .commit()
            .context("failed to commit seed records")?;

        tracing::info!(
            vaccines_inserted = vaccines.inserted,
            milestones_inserted = milestones.inserted,
            "seeded reference records"
        );
        Ok(SeedReport {
            backend: "native",
            tables: vec![vaccines, milestones],
            commands: Vec::new(),
            skipped: None,
        })
    }

    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let connection = self.open_connection()?;
        let count: i64 =
            connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn seed_vaccines(transaction: &Transaction<'_>, catalog: &SeedCatalog) -> Result<SeedTableReport> {
    let mut statement = transaction.prepare(&format!(
        r#"
        INSERT INTO {VACCINE_TABLE} (
            vaccine_name, description, age_in_months, dose_number, is_mandatory,
            protects_against, side_effects, notes
        )
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
        WHERE NOT EXISTS (SELECT 1 FROM {VACCINE_TABLE} WHERE vaccine_name = ?1)
        "#
    ))?;
    let mut report = SeedTableReport {
        table: VACCINE_TABLE.to_string(),
        inserted: 0,
        already_present: 0,
    };
    for vaccine in &catalog.vaccines {
        let changed = statement
            .execute(params![
                vaccine.vaccine_name,
                vaccine.description,
                vaccine.age_in_months,
                vaccine.dose_number,
                vaccine.is_mandatory,
                vaccine.protects_against,
                vaccine.side_effects,
                vaccine.notes,
            ])
            .with_context(|| format!("failed to seed vaccine '{}'", vaccine.vaccine_name))?;
        if changed == 0 {
            report.already_present += 1;
        } else {
            report.inserted += 1;
        }
    }
    Ok(report)
}

fn seed_milestones(
    transaction: &Transaction<'_>,
    catalog: &SeedCatalog,
) -> Result<SeedTableReport> {
    let mut statement = transaction.prepare(&format!(
        r#"
        INSERT INTO {MILESTONE_TABLE} (category, title, description, typical_age_months)
        SELECT ?1, ?2, ?3, ?4
        WHERE NOT EXISTS (SELECT 1 FROM {MILESTONE_TABLE} WHERE title = ?2)
        "#
    ))?;
    let mut report = SeedTableReport {
        table: MILESTONE_TABLE.to_string(),
        inserted: 0,
        already_present: 0,
    };
    for milestone in &catalog.milestones {
        let changed = statement
            .execute(params![
                milestone.category,
                milestone.title,
                milestone.description_text(),
                milestone.typical_age_months,
            ])
            .with_context(|| format!("failed to seed milestone '{}'", milestone.title))?;
        if changed == 0 {
            report.already_present += 1;
        } else {
            report.inserted += 1;
        }
    }
    Ok(report)
}
