use std::path::PathBuf;

use ready_cli::{Cli, CliInstallStrategy};
use ready_env::StrategyPreference;
use ready_orchestrator::{ConfigOverrides, RunOptions};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) fn strategy_preference(strategy: CliInstallStrategy) -> StrategyPreference {
    match strategy {
        CliInstallStrategy::Auto => StrategyPreference::Auto,
        CliInstallStrategy::Isolated => StrategyPreference::Isolated,
        CliInstallStrategy::Colocated => StrategyPreference::Colocated,
        CliInstallStrategy::System => StrategyPreference::System,
    }
}

pub(crate) fn config_overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        python: cli.python.clone(),
        strategy: cli.strategy.map(strategy_preference),
        venv_dir: cli.venv_dir.clone(),
        break_system_packages: cli.break_system_packages,
        skip_seed: cli.skip_seed,
        assets_fatal: cli.assets_fatal,
        state_dir: cli.state_dir.clone(),
        command_timeout_secs: cli.command_timeout_secs,
    }
}

pub(crate) fn run_options(cli: &Cli) -> RunOptions {
    RunOptions {
        dry_run: cli.dry_run,
        virtual_env: std::env::var_os("VIRTUAL_ENV")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from),
    }
}

pub(crate) fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    // stdout carries the progress markers and the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
