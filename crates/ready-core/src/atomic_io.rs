use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

fn staging_path(target: &Path, dir: &Path) -> PathBuf {
    let stem = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    dir.join(format!(
        ".{stem}.tmp-{}-{}",
        std::process::id(),
        current_unix_timestamp_ms()
    ))
}

/// Replaces `target` with `content` via a synced sibling file and a rename.
///
/// Readers of the run report or ledger exports see either the previous file
/// or the complete new one.
pub fn write_text_atomic(target: &Path, content: &str) -> Result<()> {
    if target.as_os_str().is_empty() {
        bail!("refusing to write to an empty path");
    }
    if target.is_dir() {
        bail!("cannot replace {}: it is a directory", target.display());
    }

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;

    let staged = staging_path(target, dir);
    let mut file =
        File::create(&staged).with_context(|| format!("cannot stage {}", staged.display()))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("cannot flush {}", staged.display()))?;
    drop(file);

    if let Err(error) = fs::rename(&staged, target) {
        let _ = fs::remove_file(&staged);
        return Err(error)
            .with_context(|| format!("cannot rename staged file into {}", target.display()));
    }
    Ok(())
}
