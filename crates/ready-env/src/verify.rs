//! Installation verification phase.
//!
//! Imports the framework through the same runtime later phases use and reads
//! its distribution version, turning a silent or partial install into an
//! immediate error.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use ready_core::CommandRunner;

use crate::manifest::DependencyManifest;
use crate::python_runtime::PythonRuntime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkTarget {
    /// Importable module, e.g. `django`.
    pub module: String,
    /// Distribution name as it appears in the manifest, e.g. `Django`.
    pub package: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub package: String,
    pub installed_version: String,
    pub pinned_version: Option<String>,
    pub warnings: Vec<String>,
}

fn version_probe_script(target: &FrameworkTarget) -> String {
    format!(
        "import importlib, importlib.metadata; importlib.import_module({module:?}); \
         print(importlib.metadata.version({package:?}))",
        module = target.module,
        package = target.package,
    )
}

/// Splits a version into its numeric release (trailing zeros dropped) and the
/// lowercased remainder, so `4.2`, `4.2.0` and `v4.02` compare equal.
fn normalized_version(version: &str) -> (Vec<u64>, String) {
    let lowered = version.trim().to_ascii_lowercase();
    let unprefixed = lowered.strip_prefix('v').unwrap_or(&lowered);
    let split = unprefixed
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(unprefixed.len());
    let (release, suffix) = unprefixed.split_at(split);

    let mut segments: Vec<u64> = release
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.parse().unwrap_or(u64::MAX))
        .collect();
    while segments.last() == Some(&0) {
        segments.pop();
    }
    let suffix = suffix.trim_start_matches(['.', '-', '_']).to_string();
    (segments, suffix)
}

pub fn versions_match(pinned: &str, installed: &str) -> bool {
    normalized_version(pinned) == normalized_version(installed)
}

pub fn verify_installation(
    runner: &dyn CommandRunner,
    runtime: &PythonRuntime,
    target: &FrameworkTarget,
    manifest: &DependencyManifest,
) -> Result<VerifyReport> {
    let spec = runtime.command(["-c".to_string(), version_probe_script(target)]);
    let outcome = runner
        .run(&spec)
        .and_then(|outcome| outcome.ensure_success(&spec))
        .with_context(|| {
            format!(
                "framework module '{}' is not importable with {}",
                target.module,
                runtime.interpreter.display()
            )
        })?;

    let installed_version = outcome
        .stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_default();
    if installed_version.is_empty() {
        bail!(
            "framework package '{}' reported an empty version",
            target.package
        );
    }

    let mut warnings = Vec::new();
    let pinned_version = match manifest.find(&target.package) {
        Some(requirement) => requirement.pinned_version().map(str::to_string),
        None => {
            warnings.push(format!(
                "framework package '{}' is not declared in the dependency manifest",
                target.package
            ));
            None
        }
    };

    if let Some(pinned) = &pinned_version {
        if !versions_match(pinned, &installed_version) {
            bail!(
                "framework package '{}' is {} but the manifest pins {}",
                target.package,
                installed_version,
                pinned
            );
        }
    }

    tracing::info!(
        package = %target.package,
        version = %installed_version,
        "framework import verified"
    );
    Ok(VerifyReport {
        package: target.package.clone(),
        installed_version,
        pinned_version,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest;
    use ready_core::{ScriptedCommandRunner, ScriptedResponse};

    fn django() -> FrameworkTarget {
        FrameworkTarget {
            module: "django".to_string(),
            package: "Django".to_string(),
        }
    }

    fn runtime() -> PythonRuntime {
        PythonRuntime::new("/srv/app/.venv/bin/python", "/srv/app")
    }

    #[test]
    fn functional_verify_accepts_matching_pinned_version() {
        let manifest = parse_manifest("Django==4.2.7\n").expect("manifest");
        let runner =
            ScriptedCommandRunner::new().respond("importlib", ScriptedResponse::stdout("4.2.7\n"));
        let report = verify_installation(&runner, &runtime(), &django(), &manifest).expect("verify");
        assert_eq!(report.installed_version, "4.2.7");
        assert_eq!(report.pinned_version.as_deref(), Some("4.2.7"));
        assert!(report.warnings.is_empty());
        assert!(runner.call_lines()[0].contains("import_module(\"django\")"));
    }

    #[test]
    fn regression_verify_rejects_version_drift_from_pin() {
        let manifest = parse_manifest("Django==4.2.7\n").expect("manifest");
        let runner =
            ScriptedCommandRunner::new().respond("importlib", ScriptedResponse::stdout("5.0.1\n"));
        let error =
            verify_installation(&runner, &runtime(), &django(), &manifest).expect_err("drift");
        assert!(error.to_string().contains("manifest pins 4.2.7"));
    }

    #[test]
    fn regression_verify_accepts_zero_padded_release_pin() {
        let manifest = parse_manifest("Django==4.2.0\n").expect("manifest");
        let runner =
            ScriptedCommandRunner::new().respond("importlib", ScriptedResponse::stdout("4.2\n"));
        let report = verify_installation(&runner, &runtime(), &django(), &manifest).expect("verify");
        assert_eq!(report.installed_version, "4.2");
        assert_eq!(report.pinned_version.as_deref(), Some("4.2.0"));
    }

    #[test]
    fn unit_versions_match_compares_release_segments_and_suffix() {
        assert!(versions_match("4.2.0", "4.2"));
        assert!(versions_match("4.2", "4.2.0.0"));
        assert!(versions_match("4.02.7", "4.2.7"));
        assert!(versions_match("5.0RC1", "5.0.0rc1"));
        assert!(!versions_match("4.2.7", "4.2.70"));
        assert!(!versions_match("4.2", "4.2.1"));
        assert!(!versions_match("5.0rc1", "5.0"));
    }

    #[test]
    fn regression_verify_reports_import_failure_with_interpreter() {
        let manifest = parse_manifest("Django==4.2.7\n").expect("manifest");
        let runner = ScriptedCommandRunner::new().respond(
            "importlib",
            ScriptedResponse::fail(1, "ModuleNotFoundError: No module named 'django'"),
        );
        let error =
            verify_installation(&runner, &runtime(), &django(), &manifest).expect_err("import");
        let rendered = format!("{error:#}");
        assert!(rendered.contains("not importable with /srv/app/.venv/bin/python"));
        assert!(rendered.contains("ModuleNotFoundError"));
    }

    #[test]
    fn functional_verify_warns_when_framework_is_undeclared() {
        let manifest = parse_manifest("whitenoise\n").expect("manifest");
        let runner =
            ScriptedCommandRunner::new().respond("importlib", ScriptedResponse::stdout("4.2.7"));
        let report = verify_installation(&runner, &runtime(), &django(), &manifest).expect("verify");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.pinned_version.is_none());
    }
}
