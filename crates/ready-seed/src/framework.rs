use std::path::Path;

use anyhow::{Context, Result};

use ready_core::CommandRunner;
use ready_env::PythonRuntime;

use crate::SeedReport;

/// Runs the application's seed management command.
///
/// The command is only trusted to run when it is declared idempotent; otherwise
/// the phase skips it rather than risk appending duplicate rows.
pub fn run_framework_seed(
    runner: &dyn CommandRunner,
    runtime: &PythonRuntime,
    manage_py: &Path,
    command: &str,
    idempotent: bool,
) -> Result<SeedReport> {
    if !idempotent {
        let reason = format!(
            "seed command '{command}' is not declared idempotent; set seed.framework_command_idempotent = true or use native mode"
        );
        tracing::warn!(command, "skipping seed command not declared idempotent");
        return Ok(SeedReport {
            backend: "framework",
            tables: Vec::new(),
            commands: Vec::new(),
            skipped: Some(reason),
        });
    }

    let spec = runtime.manage(manage_py, command.split_whitespace());
    tracing::info!(command = %spec.display_line(), "seeding reference records");
    runner
        .run(&spec)
        .and_then(|outcome| outcome.ensure_success(&spec))
        .with_context(|| format!("seed command '{command}' failed"))?;

    Ok(SeedReport {
        backend: "framework",
        tables: Vec::new(),
        commands: vec![spec.display_line()],
        skipped: None,
    })
}
