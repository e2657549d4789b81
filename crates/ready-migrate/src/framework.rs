//! Framework-driven migrations: generate descriptors from model definitions,
//! then apply whatever the framework reports as unapplied.

use std::path::Path;

use anyhow::{Context, Result};

use ready_core::CommandRunner;
use ready_env::PythonRuntime;

use crate::MigrationReport;

const APPLYING_PREFIX: &str = "Applying ";

/// Extracts `app.0001_initial` style names from `migrate` output.
pub fn parse_applied_migrations(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(APPLYING_PREFIX))
        .filter_map(|rest| {
            let name = rest.split("...").next().unwrap_or_default().trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

pub fn run_framework_migrations(
    runner: &dyn CommandRunner,
    runtime: &PythonRuntime,
    manage_py: &Path,
) -> Result<MigrationReport> {
    let generate = runtime.manage(manage_py, ["makemigrations", "--noinput"]);
    tracing::info!(command = %generate.display_line(), "generating schema descriptors");
    runner
        .run(&generate)
        .and_then(|outcome| outcome.ensure_success(&generate))
        .context("failed to generate schema descriptors from model definitions")?;

    let apply = runtime.manage(manage_py, ["migrate", "--noinput"]);
    tracing::info!(command = %apply.display_line(), "applying schema descriptors");
    let outcome = runner
        .run(&apply)
        .and_then(|outcome| outcome.ensure_success(&apply))
        .context("failed to apply schema descriptors")?;

    let applied = parse_applied_migrations(&outcome.stdout);
    if applied.is_empty() {
        tracing::info!("schema already at latest descriptor");
    }
    Ok(MigrationReport {
        backend: "framework",
        applied,
        already_applied: 0,
        commands: vec![generate.display_line(), apply.display_line()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ready_core::{ScriptedCommandRunner, ScriptedResponse};

    const MIGRATE_OUTPUT: &str = "\
Operations to perform:
  Apply all migrations: admin, auth, child_tracker, contenttypes, sessions
Running migrations:
  Applying contenttypes.0001_initial... OK
  Applying auth.0001_initial... OK
  Applying child_tracker.0001_initial... OK
";

    fn runtime() -> PythonRuntime {
        PythonRuntime::new("/srv/app/.venv/bin/python", "/srv/app")
    }

    #[test]
    fn unit_parse_applied_migrations_reads_applying_lines() {
        assert_eq!(
            parse_applied_migrations(MIGRATE_OUTPUT),
            vec![
                "contenttypes.0001_initial",
                "auth.0001_initial",
                "child_tracker.0001_initial"
            ]
        );
        assert!(parse_applied_migrations("Running migrations:\n  No migrations to apply.\n")
            .is_empty());
    }

    #[test]
    fn functional_framework_migrations_generate_then_apply() {
        let runner = ScriptedCommandRunner::new()
            .respond("migrate --noinput", ScriptedResponse::stdout(MIGRATE_OUTPUT));
        let report =
            run_framework_migrations(&runner, &runtime(), Path::new("manage.py")).expect("migrate");

        let lines = runner.call_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("manage.py makemigrations --noinput"));
        assert!(lines[1].ends_with("manage.py migrate --noinput"));
        assert_eq!(report.applied.len(), 3);
        assert!(!report.is_noop());
    }

    #[test]
    fn regression_makemigrations_failure_stops_before_migrate() {
        let runner = ScriptedCommandRunner::new().respond(
            "makemigrations",
            ScriptedResponse::fail(1, "SystemCheckError: System check identified some issues"),
        );
        let error = run_framework_migrations(&runner, &runtime(), Path::new("manage.py"))
            .expect_err("generate fails");
        assert!(format!("{error:#}").contains("SystemCheckError"));
        assert_eq!(runner.calls().len(), 1);
    }
}
