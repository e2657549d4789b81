//! Host environment handling for the dependency phases.
//!
//! Parses the dependency manifest, probes the host interpreter into an
//! [`EnvironmentDescriptor`], picks exactly one [`InstallStrategy`] per run, and
//! implements the install and verification phases on top of that choice.

pub mod descriptor;
pub mod install;
pub mod manifest;
pub mod python_runtime;
pub mod strategy;
pub mod verify;

pub use descriptor::{
    is_virtualenv_dir, probe_environment, resolve_interpreter, EnvironmentDescriptor,
    ProbeRequest, EXTERNALLY_MANAGED_MARKER,
};
pub use install::{
    install_dependencies, plan_install_commands, runtime_for_strategy, InstallContext,
    InstallReport,
};
pub use manifest::{
    load_manifest, normalize_package_name, parse_manifest, DependencyManifest, ManifestError,
    ManifestOption, Requirement, VersionOp, VersionSpecifier,
};
pub use python_runtime::{venv_interpreter_path, PythonRuntime};
pub use strategy::{
    select_install_strategy, InstallSettings, InstallStrategy, StrategyError, StrategyPreference,
};
pub use verify::{verify_installation, versions_match, FrameworkTarget, VerifyReport};
