//! Bootstrap configuration.
//!
//! Layering, lowest to highest precedence: built-in defaults, `ready.toml` (or
//! the `--config` file), then [`ConfigOverrides`] taken from flags and
//! `READY_*` variables. Relative paths are resolved against the project root.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ready_env::StrategyPreference;

pub const DEFAULT_CONFIG_FILE: &str = "ready.toml";
pub const RUN_REPORT_FILE: &str = "last-run.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrateMode {
    #[default]
    Framework,
    Sql,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedMode {
    #[default]
    Framework,
    Native,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetsMode {
    #[default]
    Framework,
    Native,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PythonConfig {
    /// Host interpreter; `python3` then `python` from `PATH` when unset.
    pub interpreter: Option<String>,
    pub manage_py: PathBuf,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            manage_py: PathBuf::from("manage.py"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InstallConfig {
    pub manifest: PathBuf,
    pub strategy: StrategyPreference,
    pub venv_dir: PathBuf,
    pub colocated_target: PathBuf,
    pub break_system_packages: Option<bool>,
    pub extra_args: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("requirements.txt"),
            strategy: StrategyPreference::Auto,
            venv_dir: PathBuf::from(".venv"),
            colocated_target: PathBuf::from("."),
            break_system_packages: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FrameworkConfig {
    pub module: String,
    pub package: String,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            module: "django".to_string(),
            package: "Django".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MigrateConfig {
    pub mode: MigrateMode,
    pub descriptors_dir: PathBuf,
    pub database: PathBuf,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            mode: MigrateMode::Framework,
            descriptors_dir: PathBuf::from("schema"),
            database: PathBuf::from("db.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SeedConfig {
    pub mode: SeedMode,
    pub database: PathBuf,
    /// JSON catalog replacing the built-in records.
    pub catalog: Option<PathBuf>,
    pub framework_command: String,
    pub framework_command_idempotent: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            mode: SeedMode::Framework,
            database: PathBuf::from("db.sqlite3"),
            catalog: None,
            framework_command: "seed_data".to_string(),
            framework_command_idempotent: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AssetsConfig {
    pub mode: AssetsMode,
    /// Native mode only; framework mode uses the project's `STATICFILES_DIRS`.
    pub sources: Vec<PathBuf>,
    /// Native mode only; framework mode writes to `STATIC_ROOT`.
    pub output: PathBuf,
    pub fatal: bool,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            mode: AssetsMode::Framework,
            sources: vec![PathBuf::from("static")],
            output: PathBuf::from("staticfiles_build/static"),
            fatal: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProcessConfig {
    /// Added to every child process environment.
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BootstrapConfig {
    /// Absolute after loading. A value in the file is relative to the file's
    /// directory; when the file leaves it unset the `--project-root` flag applies.
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub command_timeout_secs: Option<u64>,
    pub python: PythonConfig,
    pub install: InstallConfig,
    pub framework: FrameworkConfig,
    pub migrate: MigrateConfig,
    pub seed: SeedConfig,
    pub assets: AssetsConfig,
    pub process: ProcessConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::new(),
            state_dir: PathBuf::from(".ready"),
            command_timeout_secs: None,
            python: PythonConfig::default(),
            install: InstallConfig::default(),
            framework: FrameworkConfig::default(),
            migrate: MigrateConfig::default(),
            seed: SeedConfig::default(),
            assets: AssetsConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

/// Values supplied on the command line or through `READY_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub python: Option<String>,
    pub strategy: Option<StrategyPreference>,
    pub venv_dir: Option<PathBuf>,
    pub break_system_packages: Option<bool>,
    pub skip_seed: bool,
    pub assets_fatal: Option<bool>,
    pub state_dir: Option<PathBuf>,
    pub command_timeout_secs: Option<u64>,
}

impl BootstrapConfig {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: error.to_string(),
        })
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(python) = &overrides.python {
            self.python.interpreter = Some(python.clone());
        }
        if let Some(strategy) = overrides.strategy {
            self.install.strategy = strategy;
        }
        if let Some(venv_dir) = &overrides.venv_dir {
            self.install.venv_dir = venv_dir.clone();
        }
        if overrides.break_system_packages.is_some() {
            self.install.break_system_packages = overrides.break_system_packages;
        }
        if overrides.skip_seed {
            self.seed.mode = SeedMode::Disabled;
        }
        if let Some(fatal) = overrides.assets_fatal {
            self.assets.fatal = fatal;
        }
        if let Some(state_dir) = &overrides.state_dir {
            self.state_dir = state_dir.clone();
        }
        if overrides.command_timeout_secs.is_some() {
            self.command_timeout_secs = overrides.command_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_dotted_identifier(&self.framework.module) {
            return Err(ConfigError::Invalid(format!(
                "framework.module '{}' is not an importable module name",
                self.framework.module
            )));
        }
        if self.framework.package.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "framework.package must not be empty".to_string(),
            ));
        }
        if self.command_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "command_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.seed.mode == SeedMode::Framework && self.seed.framework_command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "seed.framework_command must not be empty in framework mode".to_string(),
            ));
        }
        if self.assets.mode == AssetsMode::Native && self.assets.sources.is_empty() {
            return Err(ConfigError::Invalid(
                "assets.sources must list at least one directory in native mode".to_string(),
            ));
        }
        for key in self.process.env.keys() {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ConfigError::Invalid(format!(
                    "process.env key '{key}' is not a valid environment variable name"
                )));
            }
        }
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.project_root.join(path)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.install.manifest)
    }

    pub fn manage_py_path(&self) -> PathBuf {
        self.resolve(&self.python.manage_py)
    }

    pub fn state_dir_path(&self) -> PathBuf {
        self.resolve(&self.state_dir)
    }

    pub fn run_report_path(&self) -> PathBuf {
        self.state_dir_path().join(RUN_REPORT_FILE)
    }

    pub fn asset_sources(&self) -> Vec<PathBuf> {
        self.assets
            .sources
            .iter()
            .map(|source| self.resolve(source))
            .collect()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn is_dotted_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|first| first == '_' || first.is_ascii_alphabetic())
                && chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
        })
}

fn absolutize(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads the layered configuration for a run.
///
/// An explicit `config_path` must exist; otherwise `<project_root>/ready.toml`
/// is used when present and built-in defaults apply when it is not.
pub fn load_config(
    project_root: &Path,
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<BootstrapConfig, ConfigError> {
    let project_root = absolutize(project_root)?;
    let candidate = match config_path {
        Some(path) => Some(absolutize(path)?),
        None => {
            let default_path = project_root.join(DEFAULT_CONFIG_FILE);
            default_path.is_file().then_some(default_path)
        }
    };

    let mut config = match &candidate {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let mut config = BootstrapConfig::from_toml_str(&raw, path)?;
            config.project_root = if config.project_root.as_os_str().is_empty() {
                project_root
            } else {
                let base = path.parent().unwrap_or(Path::new("."));
                base.join(&config.project_root)
            };
            tracing::info!(path = %path.display(), "loaded bootstrap config");
            config
        }
        None => BootstrapConfig {
            project_root,
            ..BootstrapConfig::default()
        },
    };

    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}
