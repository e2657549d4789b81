//! SQL schema descriptors and their dependency ordering.
//!
//! A descriptor is a `.sql` file. Files at the top of the descriptor directory
//! are identified by their stem; files one level down are scoped by their
//! directory (`child_tracker/0002_milestones.sql` is `child_tracker.0002_milestones`).
//! Dependencies are declared in the leading comment block:
//!
//! ```sql
//! -- depends: users.0001_initial, child_tracker.0001_initial
//! CREATE TABLE ...
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DESCRIPTOR_EXTENSION: &str = "sql";
const DEPENDS_KEY: &str = "depends:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub id: String,
    pub path: PathBuf,
    pub depends_on: Vec<String>,
    pub sql: String,
    pub checksum: String,
}

impl SchemaDescriptor {
    pub fn from_source(id: impl Into<String>, path: impl Into<PathBuf>, sql: String) -> Self {
        let depends_on = parse_descriptor_header(&sql);
        let checksum = sql_checksum(&sql);
        Self {
            id: id.into(),
            path: path.into(),
            depends_on,
            sql,
            checksum,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorGraphError {
    #[error("descriptor '{id}' depends on unknown descriptor '{missing}'")]
    MissingDependency { id: String, missing: String },
    #[error("descriptor dependency cycle involving: {}", members.join(", "))]
    Cycle { members: Vec<String> },
    #[error("descriptor id '{id}' is defined by both {first} and {second}")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },
    #[error(
        "descriptor '{id}' was already applied with checksum {recorded} but the file now hashes to {current}"
    )]
    ChecksumDrift {
        id: String,
        recorded: String,
        current: String,
    },
}

pub fn sql_checksum(sql: &str) -> String {
    format!("{:x}", Sha256::digest(sql.as_bytes()))
}

/// Reads `-- depends:` lines from the leading comment block.
pub fn parse_descriptor_header(sql: &str) -> Vec<String> {
    let mut depends_on = Vec::new();
    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(comment) = trimmed.strip_prefix("--") else {
            break;
        };
        let comment = comment.trim();
        let Some(prefix) = comment.get(..DEPENDS_KEY.len()) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case(DEPENDS_KEY) {
            continue;
        }
        for dependency in comment[DEPENDS_KEY.len()..].split(',') {
            let dependency = dependency.trim();
            if !dependency.is_empty() && !depends_on.iter().any(|known| known == dependency) {
                depends_on.push(dependency.to_string());
            }
        }
    }
    depends_on
}

fn is_descriptor_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(DESCRIPTOR_EXTENSION))
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read descriptor directory {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to list descriptor directory {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}

fn read_descriptor(id: String, path: &Path) -> Result<SchemaDescriptor> {
    let sql = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptor {}", path.display()))?;
    Ok(SchemaDescriptor::from_source(id, path, sql))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Loads every descriptor under `dir` (top level plus one directory deep).
pub fn load_descriptors(dir: &Path) -> Result<Vec<SchemaDescriptor>> {
    let mut descriptors: Vec<SchemaDescriptor> = Vec::new();
    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();

    let mut push = |descriptor: SchemaDescriptor| -> Result<()> {
        if let Some(first) = seen.get(&descriptor.id) {
            return Err(DescriptorGraphError::DuplicateId {
                id: descriptor.id.clone(),
                first: first.display().to_string(),
                second: descriptor.path.display().to_string(),
            }
            .into());
        }
        seen.insert(descriptor.id.clone(), descriptor.path.clone());
        descriptors.push(descriptor);
        Ok(())
    };

    for entry in sorted_entries(dir)? {
        if entry.is_dir() {
            let scope = file_stem(&entry);
            for nested in sorted_entries(&entry)? {
                if is_descriptor_file(&nested) {
                    push(read_descriptor(format!("{scope}.{}", file_stem(&nested)), &nested)?)?;
                }
            }
        } else if is_descriptor_file(&entry) {
            push(read_descriptor(file_stem(&entry), &entry)?)?;
        }
    }

    Ok(descriptors)
}

/// Topologically orders descriptors; among ready descriptors the smallest id goes first.
pub fn order_descriptors(
    descriptors: Vec<SchemaDescriptor>,
) -> Result<Vec<SchemaDescriptor>, DescriptorGraphError> {
    let mut by_id: BTreeMap<String, SchemaDescriptor> = BTreeMap::new();
    for descriptor in descriptors {
        by_id.insert(descriptor.id.clone(), descriptor);
    }

    let mut remaining_deps: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for descriptor in by_id.values() {
        for dependency in &descriptor.depends_on {
            if !by_id.contains_key(dependency) {
                return Err(DescriptorGraphError::MissingDependency {
                    id: descriptor.id.clone(),
                    missing: dependency.clone(),
                });
            }
            dependents
                .entry(dependency.clone())
                .or_default()
                .push(descriptor.id.clone());
        }
        remaining_deps.insert(descriptor.id.clone(), descriptor.depends_on.len());
    }

    let mut ready: BTreeSet<String> = remaining_deps
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut ordered = Vec::with_capacity(by_id.len());

    while let Some(id) = ready.pop_first() {
        if let Some(children) = dependents.get(&id) {
            for child in children {
                if let Some(count) = remaining_deps.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(child.clone());
                    }
                }
            }
        }
        if let Some(descriptor) = by_id.remove(&id) {
            ordered.push(descriptor);
        }
    }

    if !by_id.is_empty() {
        return Err(DescriptorGraphError::Cycle {
            members: by_id.into_keys().collect(),
        });
    }
    Ok(ordered)
}
