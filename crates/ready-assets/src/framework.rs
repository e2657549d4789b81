use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ready_core::CommandRunner;
use ready_env::PythonRuntime;

use crate::AssetReport;

/// Reads the copied-file count from the `collectstatic` summary line.
pub fn parse_collected_count(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.contains("static file"))
        .and_then(|line| line.split_whitespace().next())
        .and_then(|count| count.parse().ok())
}

/// Reads the `STATIC_ROOT` that `collectstatic` names in its summary line.
pub fn parse_collected_destination(stdout: &str) -> Option<PathBuf> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.contains("static file"))?;
    let (_, quoted) = line.split_once(" to '")?;
    let (destination, _) = quoted.split_once('\'')?;
    (!destination.is_empty()).then(|| PathBuf::from(destination))
}

/// The destination is whatever `STATIC_ROOT` the project settings name;
/// `assets.output` only drives native collection.
pub fn run_framework_collectstatic(
    runner: &dyn CommandRunner,
    runtime: &PythonRuntime,
    manage_py: &Path,
) -> Result<AssetReport> {
    let spec = runtime.manage(manage_py, ["collectstatic", "--noinput", "--clear"]);
    tracing::info!(command = %spec.display_line(), "collecting static assets");
    let outcome = runner
        .run(&spec)
        .and_then(|outcome| outcome.ensure_success(&spec))
        .context("static asset collection failed")?;

    let mut warnings = Vec::new();
    let copied = match parse_collected_count(&outcome.stdout) {
        Some(copied) => copied,
        None => {
            warnings.push("collectstatic did not report a copied-file count".to_string());
            0
        }
    };
    Ok(AssetReport {
        backend: "framework",
        output: parse_collected_destination(&outcome.stdout),
        copied,
        shadowed: 0,
        missing_sources: Vec::new(),
        commands: vec![spec.display_line()],
        warnings,
    })
}
