//! The bootstrap state machine.
//!
//! Phases run strictly in [`Phase::ALL`] order on the calling thread. The run
//! starts `unbootstrapped` and ends either `ready` or `failed at <phase>`; a
//! fatal failure stops the loop so no later phase observes a half-built host.

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;

use ready_assets::{collect_static, run_framework_collectstatic, CollectRequest};
use ready_core::{current_unix_timestamp_ms, elapsed_ms, CommandRunner};
use ready_env::{
    install_dependencies, load_manifest, plan_install_commands, probe_environment,
    select_install_strategy, verify_installation, DependencyManifest, EnvironmentDescriptor,
    FrameworkTarget, InstallContext, InstallSettings, InstallStrategy, ProbeRequest,
    PythonRuntime,
};
use ready_migrate::{run_framework_migrations, SqlLedger};
use ready_seed::{load_catalog, run_framework_seed, NativeSeeder};

use crate::config::{AssetsMode, BootstrapConfig, MigrateMode, SeedMode};
use crate::phase::{Phase, PhasePolicy};
use crate::progress::{render_final_state, render_phase_finish, render_phase_start};
use crate::report::{
    write_run_report, BootstrapReport, PhaseOutcome, PhaseStatus, RunState,
    RUN_REPORT_SCHEMA_VERSION,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    /// `VIRTUAL_ENV` from the invoking shell.
    pub virtual_env: Option<PathBuf>,
}

struct PhaseSuccess {
    status: PhaseStatus,
    detail: Option<serde_json::Value>,
    warnings: Vec<String>,
}

impl PhaseSuccess {
    fn completed(detail: impl Serialize, warnings: Vec<String>) -> Self {
        let status = if warnings.is_empty() {
            PhaseStatus::Ok
        } else {
            PhaseStatus::Warning
        };
        Self {
            status,
            detail: serde_json::to_value(detail).ok(),
            warnings,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: PhaseStatus::Skipped,
            detail: Some(serde_json::json!({ "reason": reason.into() })),
            warnings: Vec::new(),
        }
    }
}

struct Pipeline<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a BootstrapConfig,
    options: &'a RunOptions,
    strategy: Option<InstallStrategy>,
    runtime: Option<PythonRuntime>,
    manifest: Option<DependencyManifest>,
}

impl<'a> Pipeline<'a> {
    fn new(
        runner: &'a dyn CommandRunner,
        config: &'a BootstrapConfig,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            runner,
            config,
            options,
            strategy: None,
            runtime: None,
            manifest: None,
        }
    }

    fn run_phase(&mut self, phase: Phase) -> Result<PhaseSuccess> {
        match phase {
            Phase::DependencyInstall => self.install(),
            Phase::InstallVerification => self.verify(),
            Phase::SchemaMigration => self.migrate(),
            Phase::SeedData => self.seed(),
            Phase::StaticAssets => self.assets(),
        }
    }

    fn runtime(&self) -> Result<&PythonRuntime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| anyhow!("dependency installation has not produced a runtime"))
    }

    fn require_manage_py(&self) -> Result<()> {
        let manage_py = self.config.manage_py_path();
        if !manage_py.is_file() {
            bail!(
                "framework management script {} does not exist",
                manage_py.display()
            );
        }
        Ok(())
    }

    fn probe(&self) -> Result<EnvironmentDescriptor> {
        probe_environment(
            self.runner,
            &ProbeRequest {
                interpreter: self.config.python.interpreter.as_deref(),
                project_root: &self.config.project_root,
                venv_dir: &self.config.install.venv_dir,
                virtual_env_var: self.options.virtual_env.clone(),
            },
        )
    }

    fn select_strategy(&self, descriptor: &EnvironmentDescriptor) -> Result<InstallStrategy> {
        let install = &self.config.install;
        let settings = InstallSettings {
            preference: install.strategy,
            venv_dir: self.config.resolve(&install.venv_dir),
            colocated_target: self.config.resolve(&install.colocated_target),
            break_system_packages: install.break_system_packages,
        };
        let strategy = select_install_strategy(descriptor, &settings)?;
        tracing::info!(strategy = %strategy, "selected install strategy");
        Ok(strategy)
    }

    fn install(&mut self) -> Result<PhaseSuccess> {
        let manifest_path = self.config.manifest_path();
        let manifest = load_manifest(&manifest_path)?;
        let descriptor = self.probe()?;
        let strategy = self.select_strategy(&descriptor)?;

        let ctx = InstallContext {
            host_interpreter: &descriptor.interpreter,
            project_root: &self.config.project_root,
            manifest_path: &manifest_path,
            extra_args: &self.config.install.extra_args,
            env: &self.config.process.env,
            timeout: self.config.command_timeout(),
        };
        let report = install_dependencies(self.runner, &strategy, &ctx)?;

        let mut warnings = Vec::new();
        if manifest.is_empty() {
            warnings.push(format!(
                "dependency manifest {} declares no packages",
                manifest_path.display()
            ));
        }
        let detail = serde_json::json!({
            "environment": descriptor,
            "install": report,
            "requirements": manifest.requirements.len(),
        });
        self.runtime = Some(report.runtime);
        self.strategy = Some(strategy);
        self.manifest = Some(manifest);
        Ok(PhaseSuccess::completed(detail, warnings))
    }

    fn verify(&mut self) -> Result<PhaseSuccess> {
        let manifest = self
            .manifest
            .as_ref()
            .ok_or_else(|| anyhow!("dependency manifest was not loaded"))?;
        let target = FrameworkTarget {
            module: self.config.framework.module.clone(),
            package: self.config.framework.package.clone(),
        };
        let report = verify_installation(self.runner, self.runtime()?, &target, manifest)?;
        let warnings = report.warnings.clone();
        Ok(PhaseSuccess::completed(report, warnings))
    }

    fn migrate(&mut self) -> Result<PhaseSuccess> {
        let migrate = &self.config.migrate;
        let report = match migrate.mode {
            MigrateMode::Disabled => {
                return Ok(PhaseSuccess::skipped("schema migration is disabled"));
            }
            MigrateMode::Framework => {
                self.require_manage_py()?;
                run_framework_migrations(
                    self.runner,
                    self.runtime()?,
                    &self.config.python.manage_py,
                )?
            }
            MigrateMode::Sql => SqlLedger::new(self.config.resolve(&migrate.database))
                .apply_dir(&self.config.resolve(&migrate.descriptors_dir))?,
        };
        Ok(PhaseSuccess::completed(report, Vec::new()))
    }

    fn seed(&mut self) -> Result<PhaseSuccess> {
        let seed = &self.config.seed;
        let report = match seed.mode {
            SeedMode::Disabled => return Ok(PhaseSuccess::skipped("seed data is disabled")),
            SeedMode::Native => {
                let catalog_path = seed.catalog.as_ref().map(|path| self.config.resolve(path));
                let catalog = load_catalog(catalog_path.as_deref())?;
                NativeSeeder::new(self.config.resolve(&seed.database)).seed(&catalog)?
            }
            SeedMode::Framework => {
                self.require_manage_py()?;
                run_framework_seed(
                    self.runner,
                    self.runtime()?,
                    &self.config.python.manage_py,
                    &seed.framework_command,
                    seed.framework_command_idempotent,
                )?
            }
        };
        if let Some(reason) = &report.skipped {
            let mut success = PhaseSuccess::skipped(reason.clone());
            success.warnings.push(reason.clone());
            return Ok(success);
        }
        Ok(PhaseSuccess::completed(report, Vec::new()))
    }

    fn assets(&mut self) -> Result<PhaseSuccess> {
        let assets = &self.config.assets;
        let report = match assets.mode {
            AssetsMode::Disabled => {
                return Ok(PhaseSuccess::skipped("static asset collection is disabled"));
            }
            AssetsMode::Native => {
                let sources = self.config.asset_sources();
                let output = self.config.resolve(&assets.output);
                collect_static(&CollectRequest {
                    sources: &sources,
                    output: &output,
                })?
            }
            AssetsMode::Framework => {
                self.require_manage_py()?;
                run_framework_collectstatic(
                    self.runner,
                    self.runtime()?,
                    &self.config.python.manage_py,
                )?
            }
        };
        let warnings = report.warnings.clone();
        Ok(PhaseSuccess::completed(report, warnings))
    }
}

fn new_report(config: &BootstrapConfig, dry_run: bool) -> BootstrapReport {
    BootstrapReport {
        schema_version: RUN_REPORT_SCHEMA_VERSION,
        started_unix_ms: current_unix_timestamp_ms(),
        finished_unix_ms: 0,
        project_root: config.project_root.clone(),
        dry_run,
        strategy: None,
        phases: Vec::new(),
        state: RunState::Unbootstrapped,
    }
}

/// Runs every phase in order, writing progress markers to `out`.
///
/// Phase failures are recorded in the returned report rather than returned as
/// errors; `Err` means progress output itself could not be written.
pub fn run_bootstrap(
    runner: &dyn CommandRunner,
    config: &BootstrapConfig,
    options: &RunOptions,
    out: &mut dyn Write,
) -> Result<BootstrapReport> {
    if options.dry_run {
        return plan_bootstrap(runner, config, options, out);
    }

    let mut pipeline = Pipeline::new(runner, config, options);
    let mut report = new_report(config, false);
    let mut state = RunState::Ready;

    for phase in Phase::ALL {
        writeln!(out, "{}", render_phase_start(phase))?;
        let policy = phase.policy(config);
        let started = Instant::now();
        let result = pipeline.run_phase(phase);
        let duration_ms = elapsed_ms(started);

        let outcome = match result {
            Ok(success) => PhaseOutcome {
                phase,
                policy,
                status: success.status,
                duration_ms,
                detail: success.detail,
                error: None,
                warnings: success.warnings,
            },
            Err(error) => {
                let message = format!("{error:#}");
                let status = match policy {
                    PhasePolicy::BestEffort => PhaseStatus::Warning,
                    PhasePolicy::Fatal | PhasePolicy::Optional => PhaseStatus::Failed,
                };
                if policy == PhasePolicy::Fatal {
                    tracing::error!(phase = phase.as_str(), error = %message, "fatal phase failed");
                } else {
                    tracing::warn!(phase = phase.as_str(), error = %message, "non-fatal phase failed");
                }
                PhaseOutcome {
                    phase,
                    policy,
                    status,
                    duration_ms,
                    detail: None,
                    error: Some(message),
                    warnings: Vec::new(),
                }
            }
        };

        writeln!(
            out,
            "{}",
            render_phase_finish(phase, outcome.status, outcome.duration_ms)
        )?;
        if let Some(error) = &outcome.error {
            for line in error.lines() {
                writeln!(out, "    error: {line}")?;
            }
        }
        for warning in &outcome.warnings {
            writeln!(out, "    warning: {warning}")?;
        }

        let halt = outcome.error.is_some() && policy == PhasePolicy::Fatal;
        report.phases.push(outcome);
        if halt {
            state = RunState::Failed { phase };
            break;
        }
    }

    report.strategy = pipeline.strategy.take();
    report.state = state;
    report.finished_unix_ms = current_unix_timestamp_ms();
    writeln!(out, "{}", render_final_state(&report.state))?;

    let report_path = config.run_report_path();
    if let Err(error) = write_run_report(&report_path, &report) {
        tracing::warn!(error = %format!("{error:#}"), "run report was not persisted");
    }
    Ok(report)
}

fn describe_phase(config: &BootstrapConfig, phase: Phase) -> String {
    let manage_py = config.python.manage_py.display();
    match phase {
        Phase::DependencyInstall => "install the dependency manifest".to_string(),
        Phase::InstallVerification => format!(
            "import '{}' and read the '{}' version",
            config.framework.module, config.framework.package
        ),
        Phase::SchemaMigration => match config.migrate.mode {
            MigrateMode::Framework => {
                format!("{manage_py} makemigrations --noinput; {manage_py} migrate --noinput")
            }
            MigrateMode::Sql => format!(
                "apply {} to {}",
                config.resolve(&config.migrate.descriptors_dir).display(),
                config.resolve(&config.migrate.database).display()
            ),
            MigrateMode::Disabled => "disabled".to_string(),
        },
        Phase::SeedData => match config.seed.mode {
            SeedMode::Framework if config.seed.framework_command_idempotent => {
                format!("{manage_py} {}", config.seed.framework_command)
            }
            SeedMode::Framework => format!(
                "skip {}: command not declared idempotent",
                config.seed.framework_command
            ),
            SeedMode::Native => format!(
                "keyed insert into {}",
                config.resolve(&config.seed.database).display()
            ),
            SeedMode::Disabled => "disabled".to_string(),
        },
        Phase::StaticAssets => match config.assets.mode {
            AssetsMode::Framework => format!("{manage_py} collectstatic --noinput --clear"),
            AssetsMode::Native => format!(
                "clear {} and copy from {}",
                config.resolve(&config.assets.output).display(),
                config
                    .asset_sources()
                    .iter()
                    .map(|source| source.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            AssetsMode::Disabled => "disabled".to_string(),
        },
    }
}

/// Resolves the strategy and prints what a run would do. Only the read-only
/// interpreter probes are executed.
fn plan_bootstrap(
    runner: &dyn CommandRunner,
    config: &BootstrapConfig,
    options: &RunOptions,
    out: &mut dyn Write,
) -> Result<BootstrapReport> {
    let pipeline = Pipeline::new(runner, config, options);
    let mut report = new_report(config, true);

    let resolved = pipeline
        .probe()
        .and_then(|descriptor| {
            let strategy = pipeline.select_strategy(&descriptor)?;
            Ok((descriptor, strategy))
        })
        .context("failed to resolve install strategy");
    let (descriptor, strategy) = match resolved {
        Ok(resolved) => resolved,
        Err(error) => {
            writeln!(out, "plan: {error:#}")?;
            report.state = RunState::Failed {
                phase: Phase::DependencyInstall,
            };
            report.finished_unix_ms = current_unix_timestamp_ms();
            writeln!(out, "{}", render_final_state(&report.state))?;
            return Ok(report);
        }
    };

    writeln!(out, "plan: strategy {strategy}")?;
    let manifest_path = config.manifest_path();
    let ctx = InstallContext {
        host_interpreter: &descriptor.interpreter,
        project_root: &config.project_root,
        manifest_path: &manifest_path,
        extra_args: &config.install.extra_args,
        env: &config.process.env,
        timeout: config.command_timeout(),
    };
    for phase in Phase::ALL {
        let prefix = format!("plan [{}/{}] {}", phase.ordinal(), Phase::ALL.len(), phase.as_str());
        if phase == Phase::DependencyInstall {
            for command in plan_install_commands(&strategy, &ctx) {
                writeln!(out, "{prefix}: {}", command.display_line())?;
            }
        } else {
            writeln!(out, "{prefix}: {}", describe_phase(config, phase))?;
        }
    }

    report.strategy = Some(strategy);
    report.finished_unix_ms = current_unix_timestamp_ms();
    Ok(report)
}
