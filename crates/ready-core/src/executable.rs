//! Interpreter lookup. A configured name is resolved up front so a missing
//! binary is reported by the probe instead of as a spawn failure mid-install.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn has_exec_bit(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_metadata: &fs::Metadata) -> bool {
    true
}

fn runnable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && has_exec_bit(&metadata))
        .unwrap_or(false)
}

fn search_candidates(dir: PathBuf, name: &str) -> Vec<PathBuf> {
    let plain = dir.join(name);
    if cfg!(windows) {
        let exe = plain.with_extension("exe");
        vec![plain, exe]
    } else {
        vec![plain]
    }
}

/// Resolves `executable` to a runnable file.
///
/// Names containing a path separator are checked as given; bare names are
/// looked up on `PATH`.
pub fn resolve_executable(executable: &str) -> Option<PathBuf> {
    let name = executable.trim();
    if name.is_empty() {
        return None;
    }

    let direct = Path::new(name);
    if direct.is_absolute() || name.contains(std::path::MAIN_SEPARATOR) {
        return runnable(direct).then(|| direct.to_path_buf());
    }

    let search: OsString = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .flat_map(|dir| search_candidates(dir, name))
        .find(|candidate| runnable(candidate))
}
