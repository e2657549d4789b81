use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::CliInstallStrategy;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "ready-bootstrap",
    about = "Bring a checked-out web application to a ready-to-serve state",
    version
)]
pub struct Cli {
    #[arg(
        long = "project-root",
        env = "READY_PROJECT_ROOT",
        default_value = ".",
        help = "Application checkout containing manage.py and the requirements file"
    )]
    pub project_root: PathBuf,

    #[arg(
        long,
        env = "READY_CONFIG",
        help = "Configuration file (defaults to <project-root>/ready.toml when present)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "READY_PYTHON",
        help = "Host interpreter used for probing and environment creation"
    )]
    pub python: Option<String>,

    #[arg(
        long = "strategy",
        env = "READY_INSTALL_STRATEGY",
        value_enum,
        help = "Dependency installation strategy; auto picks from the detected environment"
    )]
    pub strategy: Option<CliInstallStrategy>,

    #[arg(
        long = "venv-dir",
        env = "READY_VENV_DIR",
        help = "Isolated environment directory, relative to the project root"
    )]
    pub venv_dir: Option<PathBuf>,

    #[arg(
        long = "break-system-packages",
        env = "READY_BREAK_SYSTEM_PACKAGES",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Pass pip's externally-managed override for colocated/system installs"
    )]
    pub break_system_packages: Option<bool>,

    #[arg(
        long = "skip-seed",
        env = "READY_SKIP_SEED",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Disable the seed data phase for this run"
    )]
    pub skip_seed: bool,

    #[arg(
        long = "assets-fatal",
        env = "READY_ASSETS_FATAL",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Treat static asset collection failures as fatal"
    )]
    pub assets_fatal: Option<bool>,

    #[arg(
        long = "state-dir",
        env = "READY_STATE_DIR",
        help = "Directory receiving last-run.json (relative to the project root)"
    )]
    pub state_dir: Option<PathBuf>,

    #[arg(
        long = "command-timeout-secs",
        env = "READY_COMMAND_TIMEOUT_SECS",
        value_parser = parse_positive_u64,
        help = "Kill any external command running longer than this many seconds"
    )]
    pub command_timeout_secs: Option<u64>,

    #[arg(
        long = "dry-run",
        default_value_t = false,
        help = "Print the resolved plan without executing any phase"
    )]
    pub dry_run: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Print the run report as JSON after the progress markers"
    )]
    pub json: bool,

    #[arg(
        long,
        short = 'v',
        default_value_t = false,
        help = "Raise the default log level to info"
    )]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;
    use crate::CliInstallStrategy;

    #[test]
    fn unit_cli_defaults_to_current_directory_without_flags() {
        let cli = Cli::try_parse_from(["ready-bootstrap"]).expect("parse");
        assert_eq!(cli.project_root, std::path::PathBuf::from("."));
        assert!(cli.strategy.is_none());
        assert!(!cli.skip_seed);
        assert!(!cli.dry_run);
    }

    #[test]
    fn functional_cli_parses_strategy_and_override_flags() {
        let cli = Cli::try_parse_from([
            "ready-bootstrap",
            "--strategy",
            "colocated",
            "--break-system-packages",
            "--skip-seed",
            "--command-timeout-secs",
            "600",
        ])
        .expect("parse");
        assert_eq!(cli.strategy, Some(CliInstallStrategy::Colocated));
        assert_eq!(cli.break_system_packages, Some(true));
        assert!(cli.skip_seed);
        assert_eq!(cli.command_timeout_secs, Some(600));
    }

    #[test]
    fn regression_cli_rejects_zero_timeout() {
        let error = Cli::try_parse_from(["ready-bootstrap", "--command-timeout-secs", "0"])
            .expect_err("zero timeout should fail");
        assert!(error.to_string().contains("greater than 0"));
    }
}
