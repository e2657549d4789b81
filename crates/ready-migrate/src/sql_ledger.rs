//! SQLite-backed descriptor ledger.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use ready_core::current_unix_timestamp_ms;

use crate::descriptor_graph::{
    load_descriptors, order_descriptors, DescriptorGraphError, SchemaDescriptor,
};
use crate::MigrationReport;

pub const LEDGER_TABLE: &str = "ready_schema_ledger";

/// Applies SQL descriptors to a SQLite store at most once each.
#[derive(Debug, Clone)]
pub struct SqlLedger {
    db_path: PathBuf,
}

impl SqlLedger {
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
        connection.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                descriptor_id TEXT PRIMARY KEY,
                checksum TEXT NOT NULL,
                applied_unix_ms INTEGER NOT NULL
            );
            "#
        ))?;
        Ok(connection)
    }

    /// Recorded descriptor ids mapped to their checksums.
    pub fn applied(&self) -> Result<BTreeMap<String, String>> {
        let connection = self.open_connection()?;
        read_applied(&connection)
    }

    pub fn apply_dir(&self, descriptors_dir: &Path) -> Result<MigrationReport> {
        let descriptors = load_descriptors(descriptors_dir)?;
        self.apply(descriptors)
    }

    pub fn apply(&self, descriptors: Vec<SchemaDescriptor>) -> Result<MigrationReport> {
        let ordered = order_descriptors(descriptors)?;
        let mut connection = self.open_connection()?;
        let recorded = read_applied(&connection)?;

        // Drift is checked for every descriptor before anything new is applied.
        for descriptor in &ordered {
            if let Some(checksum) = recorded.get(&descriptor.id) {
                if checksum != &descriptor.checksum {
                    return Err(DescriptorGraphError::ChecksumDrift {
                        id: descriptor.id.clone(),
                        recorded: checksum.clone(),
                        current: descriptor.checksum.clone(),
                    }
                    .into());
                }
            }
        }

        let known = ordered
            .iter()
            .map(|descriptor| descriptor.id.as_str())
            .collect::<Vec<_>>();
        for orphan in recorded.keys().filter(|id| !known.contains(&id.as_str())) {
            tracing::warn!(descriptor = %orphan, "ledger records a descriptor with no source file");
        }

        let mut applied = Vec::new();
        let mut already_applied = 0;
        for descriptor in &ordered {
            if recorded.contains_key(&descriptor.id) {
                already_applied += 1;
                continue;
            }
            let transaction = connection.transaction()?;
            transaction
                .execute_batch(&descriptor.sql)
                .with_context(|| {
                    format!(
                        "failed to apply descriptor '{}' from {}",
                        descriptor.id,
                        descriptor.path.display()
                    )
                })?;
            transaction.execute(
                &format!(
                    "INSERT INTO {LEDGER_TABLE} (descriptor_id, checksum, applied_unix_ms) VALUES (?1, ?2, ?3)"
                ),
                params![
                    descriptor.id,
                    descriptor.checksum,
                    i64::try_from(current_unix_timestamp_ms()).unwrap_or(i64::MAX)
                ],
            )?;
            transaction.commit()?;
            tracing::info!(descriptor = %descriptor.id, "applied schema descriptor");
            applied.push(descriptor.id.clone());
        }

        Ok(MigrationReport {
            backend: "sql",
            applied,
            already_applied,
            commands: Vec::new(),
        })
    }
}

fn read_applied(connection: &Connection) -> Result<BTreeMap<String, String>> {
    let mut statement =
        connection.prepare(&format!("SELECT descriptor_id, checksum FROM {LEDGER_TABLE}"))?;
    let rows = statement.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut applied = BTreeMap::new();
    for row in rows {
        let (id, checksum) = row?;
        applied.insert(id, checksum);
    }
    Ok(applied)
}
