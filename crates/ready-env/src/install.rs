//! Dependency installation phase.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use ready_core::{CommandRunner, CommandSpec};

use crate::python_runtime::{venv_interpreter_path, PythonRuntime};
use crate::strategy::InstallStrategy;

const BREAK_SYSTEM_PACKAGES_FLAG: &str = "--break-system-packages";

#[derive(Debug, Clone)]
pub struct InstallContext<'a> {
    pub host_interpreter: &'a Path,
    pub project_root: &'a Path,
    pub manifest_path: &'a Path,
    pub extra_args: &'a [String],
    pub env: &'a BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub strategy: InstallStrategy,
    pub runtime: PythonRuntime,
    pub commands: Vec<String>,
    pub created_venv: bool,
}

/// The interpreter and import path later phases must use under `strategy`.
pub fn runtime_for_strategy(strategy: &InstallStrategy, ctx: &InstallContext<'_>) -> PythonRuntime {
    let interpreter = match strategy {
        InstallStrategy::Isolated { venv_dir, .. } => venv_interpreter_path(venv_dir),
        InstallStrategy::Colocated { .. } | InstallStrategy::System { .. } => {
            ctx.host_interpreter.to_path_buf()
        }
    };
    let runtime = PythonRuntime::new(interpreter, ctx.project_root)
        .with_env(ctx.env.clone())
        .with_timeout(ctx.timeout);
    match strategy {
        InstallStrategy::Colocated { target_dir, .. } => runtime.with_import_path(target_dir),
        _ => runtime,
    }
}

fn venv_create_command(venv_dir: &Path, ctx: &InstallContext<'_>) -> CommandSpec {
    CommandSpec::new(ctx.host_interpreter)
        .args(["-m", "venv"])
        .arg(venv_dir.display().to_string())
        .current_dir(ctx.project_root)
        .envs(ctx.env)
        .timeout(ctx.timeout)
}

fn pip_install_command(strategy: &InstallStrategy, ctx: &InstallContext<'_>) -> CommandSpec {
    let interpreter: PathBuf = match strategy {
        InstallStrategy::Isolated { venv_dir, .. } => venv_interpreter_path(venv_dir),
        _ => ctx.host_interpreter.to_path_buf(),
    };
    let mut spec = CommandSpec::new(interpreter)
        .args(["-m", "pip", "install", "--disable-pip-version-check", "-r"])
        .arg(ctx.manifest_path.display().to_string());

    match strategy {
        InstallStrategy::Isolated { .. } => {}
        InstallStrategy::Colocated {
            target_dir,
            break_system_packages,
        } => {
            // --upgrade lets a re-run replace packages already present in the target.
            spec = spec
                .arg("--target")
                .arg(target_dir.display().to_string())
                .arg("--upgrade");
            if *break_system_packages {
                spec = spec.arg(BREAK_SYSTEM_PACKAGES_FLAG);
            }
        }
        InstallStrategy::System {
            break_system_packages,
        } => {
            if *break_system_packages {
                spec = spec.arg(BREAK_SYSTEM_PACKAGES_FLAG);
            }
        }
    }

    spec.args(ctx.extra_args.iter().cloned())
        .current_dir(ctx.project_root)
        .envs(ctx.env)
        .timeout(ctx.timeout)
}

pub fn plan_install_commands(
    strategy: &InstallStrategy,
    ctx: &InstallContext<'_>,
) -> Vec<CommandSpec> {
    let mut commands = Vec::new();
    if let InstallStrategy::Isolated {
        venv_dir,
        create: true,
    } = strategy
    {
        commands.push(venv_create_command(venv_dir, ctx));
    }
    commands.push(pip_install_command(strategy, ctx));
    commands
}

pub fn install_dependencies(
    runner: &dyn CommandRunner,
    strategy: &InstallStrategy,
    ctx: &InstallContext<'_>,
) -> Result<InstallReport> {
    if !ctx.manifest_path.is_file() {
        bail!(
            "dependency manifest {} does not exist",
            ctx.manifest_path.display()
        );
    }

    let mut commands = Vec::new();
    let mut created_venv = false;

    if let InstallStrategy::Isolated {
        venv_dir,
        create: true,
    } = strategy
    {
        let spec = venv_create_command(venv_dir, ctx);
        tracing::info!(venv_dir = %venv_dir.display(), "creating isolated environment");
        runner
            .run(&spec)
            .and_then(|outcome| outcome.ensure_success(&spec))
            .with_context(|| {
                format!("failed to create isolated environment {}", venv_dir.display())
            })?;
        commands.push(spec.display_line());
        created_venv = true;
    }

    if let InstallStrategy::Isolated { venv_dir, .. } = strategy {
        let interpreter = venv_interpreter_path(venv_dir);
        if !interpreter.is_file() {
            bail!(
                "isolated environment {} has no interpreter at {}",
                venv_dir.display(),
                interpreter.display()
            );
        }
    }

    let spec = pip_install_command(strategy, ctx);
    tracing::info!(strategy = strategy.label(), command = %spec.display_line(), "installing dependencies");
    runner
        .run(&spec)
        .and_then(|outcome| outcome.ensure_success(&spec))
        .with_context(|| format!("dependency installation failed using {strategy} strategy"))?;
    commands.push(spec.display_line());

    Ok(InstallReport {
        strategy: strategy.clone(),
        runtime: runtime_for_strategy(strategy, ctx),
        commands,
        created_venv,
    })
}
