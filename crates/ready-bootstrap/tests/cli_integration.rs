use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn binary_command() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ready-bootstrap"));
    cmd.env_remove("VIRTUAL_ENV").env_remove("RUST_LOG");
    cmd
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

fn write_project(root: &Path) {
    write(&root.join("requirements.txt"), "Django==4.2.7\nwhitenoise==6.6.0\n");
    write(&root.join("manage.py"), "#!/usr/bin/env python\n");
    write(&root.join("static/css/site.css"), "body {}\n");
}

/// A shell stand-in for the interpreter: answers the environment probe and the
/// framework version query, and succeeds at everything else.
#[cfg(unix)]
fn write_stub_interpreter(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let stdlib = dir.join("lib/python3.12");
    fs::create_dir_all(&stdlib).expect("stdlib");
    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "-c" ]; then
  case "$2" in
    *sysconfig*) echo '{{"stdlib": "{stdlib}", "prefix": "/usr", "base_prefix": "/usr", "version": "3.12.3"}}' ;;
    *importlib*) echo '4.2.7' ;;
  esac
fi
exit 0
"#,
        stdlib = stdlib.display()
    );
    let path = dir.join("bin/python3");
    write(&path, &script);
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

#[test]
fn help_lists_environment_variables() {
    let mut cmd = binary_command();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("READY_PROJECT_ROOT"))
        .stdout(predicate::str::contains("READY_INSTALL_STRATEGY"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn regression_unknown_config_key_exits_with_config_error() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());
    write(&temp.path().join("ready.toml"), "[assets]\nfatl = true\n");

    let mut cmd = binary_command();
    cmd.arg("--project-root").arg(temp.path());
    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("config error"))
        .stderr(predicate::str::contains("fatl"));
}

#[test]
fn regression_missing_interpreter_fails_at_dependency_install() {
    let temp = tempdir().expect("tempdir");
    write_project(temp.path());

    let mut cmd = binary_command();
    cmd.arg("--project-root")
        .arg(temp.path())
        .args(["--python", "/nonexistent/bin/python3"]);
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("==> [1/5] dependency_install: start"))
        .stdout(predicate::str::contains("<== [1/5] dependency_install: failed"))
        .stdout(predicate::str::contains("[2/5]").not())
        .stdout(predicate::str::contains(
            "bootstrap: failed at dependency_install",
        ));

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join(".ready/last-run.json")).expect("run report"),
    )
    .expect("report json");
    assert_eq!(report["state"], "failed");
    assert_eq!(report["phase"], "dependency_install");
}

#[cfg(unix)]
#[test]
fn functional_dry_run_prints_plan_and_leaves_project_untouched() {
    let temp = tempdir().expect("tempdir");
    let project = temp.path().join("app");
    write_project(&project);
    let interpreter = write_stub_interpreter(&temp.path().join("host"));

    let mut cmd = binary_command();
    cmd.arg("--project-root")
        .arg(&project)
        .arg("--python")
        .arg(&interpreter)
        .arg("--dry-run");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("plan: strategy isolated"))
        .stdout(predicate::str::contains("-m venv"))
        .stdout(predicate::str::contains("plan [3/5] schema_migration:"));

    assert!(!project.join(".ready").exists());
    assert!(!project.join(".venv").exists());
}

#[cfg(unix)]
#[test]
fn integration_colocated_run_reaches_ready_twice() {
    let temp = tempdir().expect("tempdir");
    let project = temp.path().join("app");
    write_project(&project);
    write(
        &project.join("ready.toml"),
        r#"
[install]
strategy = "colocated"

[seed]
mode = "native"

[assets]
mode = "native"
"#,
    );
    let interpreter = write_stub_interpreter(&temp.path().join("host"));
    write(
        &project.join("staticfiles_build/static/css/stale.css"),
        "old\n",
    );

    for _ in 0..2 {
        let mut cmd = binary_command();
        cmd.arg("--project-root")
            .arg(&project)
            .arg("--python")
            .arg(&interpreter)
            .arg("--json");
        cmd.assert()
            .success()
            .stdout(predicate::str::contains("<== [4/5] seed_data: ok"))
            .stdout(predicate::str::contains("<== [5/5] static_assets: ok"))
            .stdout(predicate::str::contains("bootstrap: ready"))
            .stdout(predicate::str::contains("\"strategy\""));
    }

    assert!(project.join("staticfiles_build/static/css/site.css").is_file());
    assert!(!project.join("staticfiles_build/static/css/stale.css").exists());

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(project.join(".ready/last-run.json")).expect("run report"),
    )
    .expect("report json");
    assert_eq!(report["state"], "ready");
    let seed = &report["phases"][3]["detail"]["tables"];
    assert_eq!(seed[0]["inserted"], 0);
    assert_eq!(seed[0]["already_present"], 10);
}
