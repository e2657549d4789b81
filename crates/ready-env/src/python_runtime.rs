use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ready_core::CommandSpec;
use serde::Serialize;

/// The interpreter and import path every phase after installation runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PythonRuntime {
    pub interpreter: PathBuf,
    /// Directory prepended to `PYTHONPATH`; set for colocated installs only.
    pub extra_import_path: Option<PathBuf>,
    pub working_dir: PathBuf,
    #[serde(skip)]
    pub env: BTreeMap<String, String>,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl PythonRuntime {
    pub fn new(interpreter: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            extra_import_path: None,
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_import_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_import_path = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(&self.interpreter)
            .args(args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .timeout(self.timeout);
        if let Some(pythonpath) = self.pythonpath() {
            spec = spec.env("PYTHONPATH", pythonpath);
        }
        spec
    }

    /// Runs `manage.py` (relative to the working directory) with `args`.
    pub fn manage<I, S>(&self, manage_py: &Path, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = vec![manage_py.display().to_string()];
        full.extend(args.into_iter().map(Into::into));
        self.command(full)
    }

    fn pythonpath(&self) -> Option<String> {
        let extra = self.extra_import_path.as_ref()?;
        let inherited = self
            .env
            .get("PYTHONPATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PYTHONPATH"))
            .filter(|value| !value.is_empty());
        let mut paths = vec![extra.clone()];
        if let Some(inherited) = inherited {
            paths.extend(std::env::split_paths(&inherited));
        }
        std::env::join_paths(paths)
            .ok()
            .map(|joined| joined.to_string_lossy().into_owned())
    }
}

pub fn venv_interpreter_path(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}
