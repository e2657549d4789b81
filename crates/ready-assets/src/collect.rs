//! Native collection: merge ordered source trees into one output directory.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::AssetReport;

#[derive(Debug, Clone)]
pub struct CollectRequest<'a> {
    /// Searched in order; the first source providing a relative path wins.
    pub sources: &'a [PathBuf],
    pub output: &'a Path,
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn comparable(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
}

/// True when either path equals or contains the other.
pub fn paths_overlap(left: &Path, right: &Path) -> bool {
    let left = comparable(left);
    let right = comparable(right);
    left.starts_with(&right) || right.starts_with(&left)
}

fn is_ignored(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~')
}

fn read_sorted_directory_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in
        std::fs::read_dir(path).with_context(|| format!("failed to read {}", path.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry in {}", path.display()))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

struct SourceWalk<'a> {
    root: &'a Path,
    /// Canonical directories on the current descent path.
    ancestors: Vec<PathBuf>,
    found: Vec<(PathBuf, PathBuf)>,
    warnings: Vec<String>,
}

impl<'a> SourceWalk<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            ancestors: Vec::new(),
            found: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn visit(&mut self, dir: &Path) -> Result<()> {
        let canonical = std::fs::canonicalize(dir)
            .with_context(|| format!("failed to resolve {}", dir.display()))?;
        if self.ancestors.contains(&canonical) {
            tracing::warn!(
                path = %dir.display(),
                "static source directory loops back on itself; skipping"
            );
            self.warnings
                .push(format!("skipped {}: symlink loop", dir.display()));
            return Ok(());
        }
        self.ancestors.push(canonical);
        let result = self.visit_entries(dir);
        self.ancestors.pop();
        result
    }

    fn visit_entries(&mut self, dir: &Path) -> Result<()> {
        for path in read_sorted_directory_paths(dir)? {
            let ignored = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_ignored);
            if ignored {
                continue;
            }
            if path.is_dir() {
                self.visit(&path)?;
            } else if path.is_file() {
                let relative = path
                    .strip_prefix(self.root)
                    .with_context(|| {
                        format!("{} escaped source {}", path.display(), self.root.display())
                    })?
                    .to_path_buf();
                self.found.push((relative, path));
            }
        }
        Ok(())
    }
}

pub fn collect_static(request: &CollectRequest<'_>) -> Result<AssetReport> {
    for source in request.sources {
        if paths_overlap(source, request.output) {
            bail!(
                "static output {} overlaps source {}; collecting would destroy or recurse into source files",
                request.output.display(),
                source.display()
            );
        }
    }

    let mut plan: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
    let mut shadowed = 0;
    let mut missing_sources = Vec::new();
    let mut warnings = Vec::new();
    for source in request.sources {
        if !source.is_dir() {
            tracing::warn!(source = %source.display(), "static source directory missing; skipping");
            warnings.push(format!("static source {} does not exist", source.display()));
            missing_sources.push(source.clone());
            continue;
        }
        let mut walk = SourceWalk::new(source);
        walk.visit(source)?;
        warnings.append(&mut walk.warnings);
        for (relative, path) in walk.found {
            if plan.contains_key(&relative) {
                tracing::debug!(path = %path.display(), "shadowed by earlier static source");
                shadowed += 1;
                continue;
            }
            plan.insert(relative, path);
        }
    }

    if request.output.exists() {
        std::fs::remove_dir_all(request.output).with_context(|| {
            format!(
                "failed to clear static output {}",
                request.output.display()
            )
        })?;
    }
    std::fs::create_dir_all(request.output)
        .with_context(|| format!("failed to create {}", request.output.display()))?;

    for (relative, source_path) in &plan {
        let destination = request.output.join(relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::copy(source_path, &destination).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source_path.display(),
                destination.display()
            )
        })?;
    }

    tracing::info!(
        output = %request.output.display(),
        copied = plan.len(),
        shadowed,
        "collected static assets"
    );
    Ok(AssetReport {
        backend: "native",
        output: Some(request.output.to_path_buf()),
        copied: plan.len(),
        shadowed,
        missing_sources,
        commands: Vec::new(),
        warnings,
    })
}
