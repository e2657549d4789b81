#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use ready_core::{ScriptedCommandRunner, ScriptedResponse};
use ready_migrate::LEDGER_TABLE;
use ready_orchestrator::{
    run_bootstrap, AssetsMode, BootstrapConfig, BootstrapReport, MigrateMode, Phase, RunOptions,
    RunState, SeedMode,
};
use ready_seed::{MILESTONE_TABLE, VACCINE_TABLE};
use rusqlite::Connection;

const VACCINE_DESCRIPTOR: &str = r#"-- depends: 0001_base
CREATE TABLE child_tracker_vaccineschedule (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    vaccine_name VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    age_in_months INTEGER UNSIGNED NOT NULL,
    dose_number INTEGER UNSIGNED NOT NULL,
    is_mandatory BOOL NOT NULL,
    protects_against VARCHAR(200) NOT NULL,
    side_effects TEXT NOT NULL,
    notes TEXT NOT NULL
);
"#;

const MILESTONE_DESCRIPTOR: &str = r#"-- depends: 0001_base
CREATE TABLE child_tracker_milestone (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    category VARCHAR(20) NOT NULL,
    title VARCHAR(200) NOT NULL,
    description TEXT NOT NULL,
    typical_age_months INTEGER UNSIGNED NOT NULL
);
"#;

struct Host {
    _temp: tempfile::TempDir,
    project: PathBuf,
    interpreter: PathBuf,
    stdlib: PathBuf,
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

impl Host {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = temp.path().join("app");
        write(&project.join("requirements.txt"), "Django==4.2.7\nwhitenoise==6.6.0\n");
        write(&project.join("manage.py"), "#!/usr/bin/env python\n");
        write(
            &project.join("schema/0001_base.sql"),
            "CREATE TABLE users_customuser (id INTEGER PRIMARY KEY, username TEXT NOT NULL);\n",
        );
        write(
            &project.join("schema/child_tracker/0001_vaccines.sql"),
            VACCINE_DESCRIPTOR,
        );
        write(
            &project.join("schema/child_tracker/0002_milestones.sql"),
            MILESTONE_DESCRIPTOR,
        );
        write(&project.join("static/css/site.css"), "body {}\n");
        write(&project.join("static/js/chat.js"), "console.log('ready');\n");

        // An existing isolated environment the auto strategy should reuse.
        write(&project.join(".venv/pyvenv.cfg"), "home = /usr/bin\n");
        let venv_python = project.join(".venv/bin/python");
        write(&venv_python, "#!/bin/sh\nexit 0\n");
        make_executable(&venv_python);

        let interpreter = temp.path().join("host/bin/python3");
        write(&interpreter, "#!/bin/sh\nexit 0\n");
        make_executable(&interpreter);
        let stdlib = temp.path().join("host/lib/python3.12");
        fs::create_dir_all(&stdlib).expect("stdlib");

        Self {
            _temp: temp,
            project,
            interpreter,
            stdlib,
        }
    }

    fn config(&self) -> BootstrapConfig {
        let mut config = BootstrapConfig {
            project_root: self.project.clone(),
            ..BootstrapConfig::default()
        };
        config.python.interpreter = Some(self.interpreter.display().to_string());
        config.migrate.mode = MigrateMode::Sql;
        config.seed.mode = SeedMode::Native;
        config.assets.mode = AssetsMode::Native;
        config
    }

    fn runner(&self) -> ScriptedCommandRunner {
        let probe = serde_json::json!({
            "stdlib": self.stdlib.display().to_string(),
            "prefix": "/usr",
            "base_prefix": "/usr",
            "version": "3.12.3",
        })
        .to_string();
        ScriptedCommandRunner::new()
            .respond("sysconfig", ScriptedResponse::stdout(probe))
            .respond("importlib", ScriptedResponse::stdout("4.2.7\n"))
    }

    fn database(&self) -> PathBuf {
        self.project.join("db.sqlite3")
    }

    fn count(&self, table: &str) -> i64 {
        let connection = Connection::open(self.database()).expect("open store");
        connection
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .expect("count rows")
    }

    fn collected_files(&self) -> Vec<PathBuf> {
        let output = self.project.join("staticfiles_build/static");
        let mut files = Vec::new();
        let mut pending = vec![output.clone()];
        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir).expect("read output") {
                let path = entry.expect("entry").path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path.strip_prefix(&output).expect("relative").to_path_buf());
                }
            }
        }
        files.sort();
        files
    }
}

fn run(runner: &ScriptedCommandRunner, config: &BootstrapConfig) -> (BootstrapReport, String) {
    let mut out = Vec::new();
    let report =
        run_bootstrap(runner, config, &RunOptions::default(), &mut out).expect("bootstrap run");
    (report, String::from_utf8(out).expect("utf8 progress"))
}

fn detail(report: &BootstrapReport, phase: Phase) -> serde_json::Value {
    report
        .outcome(phase)
        .and_then(|outcome| outcome.detail.clone())
        .expect("phase detail")
}

#[test]
fn integration_two_runs_reach_identical_ready_state() {
    let host = Host::new();
    let config = host.config();
    let runner = host.runner();

    let (first, first_stdout) = run(&runner, &config);
    assert_eq!(first.state, RunState::Ready, "{first_stdout}");
    assert_eq!(
        detail(&first, Phase::SchemaMigration)["applied"],
        serde_json::json!([
            "0001_base",
            "child_tracker.0001_vaccines",
            "child_tracker.0002_milestones"
        ])
    );
    assert_eq!(first.strategy.as_ref().map(|s| s.label()), Some("isolated"));
    let files_after_first = host.collected_files();

    let (second, second_stdout) = run(&runner, &config);
    assert_eq!(second.state, RunState::Ready, "{second_stdout}");
    let migration = detail(&second, Phase::SchemaMigration);
    assert_eq!(migration["applied"], serde_json::json!([]));
    assert_eq!(migration["already_applied"], 3);
    let seed = detail(&second, Phase::SeedData);
    assert_eq!(seed["tables"][0]["inserted"], 0);
    assert_eq!(seed["tables"][1]["inserted"], 0);

    assert_eq!(host.count(VACCINE_TABLE), 10);
    assert_eq!(host.count(MILESTONE_TABLE), 8);
    assert_eq!(host.count(LEDGER_TABLE), 3);
    assert_eq!(host.collected_files(), files_after_first);
    assert_eq!(
        files_after_first,
        vec![PathBuf::from("css/site.css"), PathBuf::from("js/chat.js")]
    );

    let venv_pip = runner
        .call_lines()
        .into_iter()
        .filter(|line| line.contains(".venv/bin/python -m pip install"))
        .count();
    assert_eq!(venv_pip, 2);
    assert!(runner.call_lines().iter().all(|line| !line.contains("-m venv")));
}

#[test]
fn integration_new_descriptor_between_runs_is_the_only_one_applied() {
    let host = Host::new();
    let config = host.config();
    let runner = host.runner();
    let (first, _) = run(&runner, &config);
    assert!(first.state.is_ready());

    write(
        &host.project.join("schema/child_tracker/0003_reminders.sql"),
        "-- depends: child_tracker.0001_vaccines\nCREATE TABLE child_tracker_reminder (id INTEGER PRIMARY KEY, note TEXT NOT NULL);\n",
    );
    let (second, _) = run(&runner, &config);
    assert!(second.state.is_ready());
    assert_eq!(
        detail(&second, Phase::SchemaMigration)["applied"],
        serde_json::json!(["child_tracker.0003_reminders"])
    );
    assert_eq!(host.count(LEDGER_TABLE), 4);
}

#[test]
fn integration_install_failure_leaves_store_and_assets_untouched() {
    let host = Host::new();
    let config = host.config();
    let runner = host.runner().respond(
        "-m pip install",
        ScriptedResponse::fail(1, "ERROR: Could not install packages due to an OSError"),
    );

    let (report, stdout) = run(&runner, &config);
    assert_eq!(
        report.state,
        RunState::Failed {
            phase: Phase::DependencyInstall
        }
    );
    assert!(stdout.contains("bootstrap: failed at dependency_install"));
    assert!(!host.database().exists());
    assert!(!host.project.join("staticfiles_build").exists());
    assert!(host.project.join(".ready/last-run.json").is_file());
}

#[test]
fn integration_edited_applied_descriptor_fails_migration_and_halts() {
    let host = Host::new();
    let config = host.config();
    let runner = host.runner();
    let (first, _) = run(&runner, &config);
    assert!(first.state.is_ready());

    write(
        &host.project.join("schema/0001_base.sql"),
        "CREATE TABLE users_customuser (id INTEGER PRIMARY KEY, username TEXT NOT NULL, email TEXT);\n",
    );
    let (second, stdout) = run(&runner, &config);
    assert_eq!(
        second.state,
        RunState::Failed {
            phase: Phase::SchemaMigration
        }
    );
    assert!(stdout.contains("0001_base"));
    assert!(second.outcome(Phase::SeedData).is_none());
}
