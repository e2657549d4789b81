//! Bootstrap orchestration.
//!
//! Loads the layered configuration, runs the five setup phases in order under
//! their failure policies, prints progress markers, and persists the run report.

pub mod config;
pub mod phase;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use config::{
    load_config, AssetsConfig, AssetsMode, BootstrapConfig, ConfigError, ConfigOverrides,
    FrameworkConfig, InstallConfig, MigrateConfig, MigrateMode, ProcessConfig, PythonConfig,
    SeedConfig, SeedMode, DEFAULT_CONFIG_FILE, RUN_REPORT_FILE,
};
pub use phase::{Phase, PhasePolicy};
pub use pipeline::{run_bootstrap, RunOptions};
pub use progress::{render_final_state, render_phase_finish, render_phase_start};
pub use report::{
    write_run_report, BootstrapReport, PhaseOutcome, PhaseStatus, RunState,
    RUN_REPORT_SCHEMA_VERSION,
};
