mod bootstrap_helpers;

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ready_cli::Cli;
use ready_core::SystemCommandRunner;
use ready_orchestrator::{load_config, run_bootstrap, BootstrapConfig, BootstrapReport};

use crate::bootstrap_helpers::{config_overrides, init_tracing, run_options};

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

fn run(cli: &Cli, config: &BootstrapConfig) -> Result<BootstrapReport> {
    let options = run_options(cli);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let report = run_bootstrap(&SystemCommandRunner, config, &options, &mut out)?;
    if cli.json {
        let payload =
            serde_json::to_string_pretty(&report).context("failed to render run report")?;
        writeln!(out, "{payload}")?;
    }
    out.flush()?;
    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(
        &cli.project_root,
        cli.config.as_deref(),
        &config_overrides(&cli),
    ) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("config error: {error}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run(&cli, &config) {
        Ok(report) => ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(EXIT_FAILED)),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}
