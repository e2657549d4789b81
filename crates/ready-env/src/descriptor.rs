//! Host environment probing.
//!
//! The descriptor is recomputed at the start of every run and never persisted.
//! All interpreter facts come from asking the interpreter itself, so the same
//! code path covers system installs, virtual environments, and distro-managed
//! Pythons carrying a PEP 668 `EXTERNALLY-MANAGED` marker.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use ready_core::{resolve_executable, CommandRunner, CommandSpec};

use crate::python_runtime::venv_interpreter_path;

pub const EXTERNALLY_MANAGED_MARKER: &str = "EXTERNALLY-MANAGED";
const PYVENV_CONFIG_FILE: &str = "pyvenv.cfg";
const DEFAULT_INTERPRETER_CANDIDATES: [&str; 2] = ["python3", "python"];

const INTERPRETER_PROBE_SCRIPT: &str = "import json, sys, sysconfig; \
print(json.dumps({'stdlib': sysconfig.get_path('stdlib'), 'prefix': sys.prefix, \
'base_prefix': getattr(sys, 'base_prefix', sys.prefix), \
'version': '%d.%d.%d' % sys.version_info[:3]}))";
const VENV_SUPPORT_PROBE_SCRIPT: &str = "import venv, ensurepip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentDescriptor {
    pub interpreter: PathBuf,
    pub python_version: String,
    pub stdlib_dir: PathBuf,
    /// Set when `VIRTUAL_ENV` is exported or the interpreter itself lives in a venv.
    pub active_virtualenv: Option<PathBuf>,
    /// The configured venv directory, when it holds both `pyvenv.cfg` and an interpreter.
    pub existing_venv: Option<PathBuf>,
    pub venv_supported: bool,
    pub externally_managed: bool,
}

#[derive(Debug, Clone)]
pub struct ProbeRequest<'a> {
    pub interpreter: Option<&'a str>,
    pub project_root: &'a Path,
    pub venv_dir: &'a Path,
    pub virtual_env_var: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct InterpreterFacts {
    stdlib: String,
    prefix: String,
    base_prefix: String,
    version: String,
}

pub fn resolve_interpreter(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(configured) = configured.map(str::trim).filter(|value| !value.is_empty()) {
        return resolve_executable(configured)
            .ok_or_else(|| anyhow!("configured interpreter '{configured}' is not an executable"));
    }
    DEFAULT_INTERPRETER_CANDIDATES
        .iter()
        .find_map(|candidate| resolve_executable(candidate))
        .ok_or_else(|| {
            anyhow!(
                "no Python interpreter found on PATH (tried {})",
                DEFAULT_INTERPRETER_CANDIDATES.join(", ")
            )
        })
}

/// A venv is reusable only once `python -m venv` got as far as the interpreter.
pub fn is_virtualenv_dir(path: &Path) -> bool {
    path.join(PYVENV_CONFIG_FILE).is_file() && venv_interpreter_path(path).is_file()
}

pub fn probe_environment(
    runner: &dyn CommandRunner,
    request: &ProbeRequest<'_>,
) -> Result<EnvironmentDescriptor> {
    let interpreter = resolve_interpreter(request.interpreter)?;

    let probe = CommandSpec::new(&interpreter)
        .args(["-c", INTERPRETER_PROBE_SCRIPT])
        .current_dir(request.project_root);
    let outcome = runner
        .run(&probe)
        .and_then(|outcome| outcome.ensure_success(&probe))
        .with_context(|| format!("failed to probe interpreter {}", interpreter.display()))?;
    let facts: InterpreterFacts = serde_json::from_str(outcome.stdout_trimmed())
        .with_context(|| {
            format!(
                "interpreter {} returned an unreadable probe result",
                interpreter.display()
            )
        })?;

    let stdlib_dir = PathBuf::from(&facts.stdlib);
    let interpreter_in_venv = facts.prefix != facts.base_prefix;
    let active_virtualenv = request
        .virtual_env_var
        .clone()
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| interpreter_in_venv.then(|| PathBuf::from(&facts.prefix)));

    // PEP 668 markers do not apply inside a virtual environment.
    let externally_managed =
        active_virtualenv.is_none() && stdlib_dir.join(EXTERNALLY_MANAGED_MARKER).is_file();

    let venv_path = request.project_root.join(request.venv_dir);
    if venv_path.join(PYVENV_CONFIG_FILE).is_file() && !is_virtualenv_dir(&venv_path) {
        tracing::warn!(
            venv_dir = %venv_path.display(),
            "virtual environment is incomplete and will be recreated"
        );
    }
    let existing_venv = is_virtualenv_dir(&venv_path).then_some(venv_path);

    let venv_probe = CommandSpec::new(&interpreter)
        .args(["-c", VENV_SUPPORT_PROBE_SCRIPT])
        .current_dir(request.project_root);
    let venv_supported = runner
        .run(&venv_probe)
        .map(|outcome| outcome.success)
        .unwrap_or(false);

    let descriptor = EnvironmentDescriptor {
        interpreter,
        python_version: facts.version,
        stdlib_dir,
        active_virtualenv,
        existing_venv,
        venv_supported,
        externally_managed,
    };
    tracing::info!(
        interpreter = %descriptor.interpreter.display(),
        python_version = %descriptor.python_version,
        externally_managed = descriptor.externally_managed,
        venv_supported = descriptor.venv_supported,
        "probed host environment"
    );
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ready_core::{ScriptedCommandRunner, ScriptedResponse};

    #[cfg(unix)]
    fn fake_interpreter(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("python3");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").expect("write interpreter");
        let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    fn probe_stdout(stdlib: &Path, prefix: &str, base_prefix: &str) -> String {
        serde_json::json!({
            "stdlib": stdlib.display().to_string(),
            "prefix": prefix,
            "base_prefix": base_prefix,
            "version": "3.12.3",
        })
        .to_string()
    }

    #[cfg(unix)]
    #[test]
    fn functional_probe_detects_externally_managed_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let interpreter = fake_interpreter(temp.path());
        let stdlib = temp.path().join("lib/python3.12");
        std::fs::create_dir_all(&stdlib).expect("stdlib");
        std::fs::write(stdlib.join(EXTERNALLY_MANAGED_MARKER), "[externally-managed]\n")
            .expect("marker");

        let runner = ScriptedCommandRunner::new()
            .respond(
                "sysconfig",
                ScriptedResponse::stdout(probe_stdout(&stdlib, "/usr", "/usr")),
            )
            .respond("ensurepip", ScriptedResponse::fail(1, "No module named ensurepip"));
        let interpreter_text = interpreter.display().to_string();
        let descriptor = probe_environment(
            &runner,
            &ProbeRequest {
                interpreter: Some(interpreter_text.as_str()),
                project_root: temp.path(),
                venv_dir: Path::new(".venv"),
                virtual_env_var: None,
            },
        )
        .expect("probe");

        assert!(descriptor.externally_managed);
        assert!(!descriptor.venv_supported);
        assert!(descriptor.active_virtualenv.is_none());
        assert!(descriptor.existing_venv.is_none());
        assert_eq!(descriptor.python_version, "3.12.3");
    }

    #[cfg(unix)]
    #[test]
    fn functional_probe_ignores_marker_inside_virtualenv_and_finds_existing_venv() {
        let temp = tempfile::tempdir().expect("tempdir");
        let interpreter = fake_interpreter(temp.path());
        let stdlib = temp.path().join("lib/python3.12");
        std::fs::create_dir_all(&stdlib).expect("stdlib");
        std::fs::write(stdlib.join(EXTERNALLY_MANAGED_MARKER), "").expect("marker");
        let venv = temp.path().join(".venv");
        std::fs::create_dir_all(&venv).expect("venv");
        std::fs::write(venv.join(PYVENV_CONFIG_FILE), "home = /usr/bin\n").expect("cfg");
        let venv_python = venv_interpreter_path(&venv);
        std::fs::create_dir_all(venv_python.parent().expect("bin dir")).expect("bin dir");
        std::fs::write(&venv_python, "").expect("venv interpreter");

        let runner = ScriptedCommandRunner::new().respond(
            "sysconfig",
            ScriptedResponse::stdout(probe_stdout(&stdlib, "/srv/app/.venv", "/usr")),
        );
        let interpreter_text = interpreter.display().to_string();
        let descriptor = probe_environment(
            &runner,
            &ProbeRequest {
                interpreter: Some(interpreter_text.as_str()),
                project_root: temp.path(),
                venv_dir: Path::new(".venv"),
                virtual_env_var: None,
            },
        )
        .expect("probe");

        assert!(!descriptor.externally_managed);
        assert_eq!(
            descriptor.active_virtualenv,
            Some(PathBuf::from("/srv/app/.venv"))
        );
        assert_eq!(descriptor.existing_venv, Some(venv));
        assert!(descriptor.venv_supported);
    }

    #[test]
    fn regression_resolve_interpreter_rejects_missing_configured_path() {
        let error = resolve_interpreter(Some("/no/such/python3")).expect_err("missing");
        assert!(error.to_string().contains("/no/such/python3"));
    }

    #[cfg(unix)]
    #[test]
    fn regression_probe_failure_names_the_interpreter() {
        let temp = tempfile::tempdir().expect("tempdir");
        let interpreter = fake_interpreter(temp.path());
        let runner = ScriptedCommandRunner::new()
            .respond("sysconfig", ScriptedResponse::fail(1, "SyntaxError"));
        let interpreter_text = interpreter.display().to_string();
        let error = probe_environment(
            &runner,
            &ProbeRequest {
                interpreter: Some(interpreter_text.as_str()),
                project_root: temp.path(),
                venv_dir: Path::new(".venv"),
                virtual_env_var: None,
            },
        )
        .expect_err("probe should fail");
        assert!(format!("{error:#}").contains("failed to probe interpreter"));
    }

    #[cfg(unix)]
    #[test]
    fn regression_interrupted_venv_without_interpreter_is_not_reused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let interpreter = fake_interpreter(temp.path());
        let stdlib = temp.path().join("lib/python3.12");
        std::fs::create_dir_all(&stdlib).expect("stdlib");
        let venv = temp.path().join(".venv");
        std::fs::create_dir_all(&venv).expect("venv");
        std::fs::write(venv.join(PYVENV_CONFIG_FILE), "home = /usr/bin\n").expect("cfg");

        let runner = ScriptedCommandRunner::new().respond(
            "sysconfig",
            ScriptedResponse::stdout(probe_stdout(&stdlib, "/usr", "/usr")),
        );
        let interpreter_text = interpreter.display().to_string();
        let descriptor = probe_environment(
            &runner,
            &ProbeRequest {
                interpreter: Some(interpreter_text.as_str()),
                project_root: temp.path(),
                venv_dir: Path::new(".venv"),
                virtual_env_var: None,
            },
        )
        .expect("probe");

        assert!(!is_virtualenv_dir(&venv));
        assert!(descriptor.existing_venv.is_none());
        assert!(descriptor.venv_supported);
    }
}
