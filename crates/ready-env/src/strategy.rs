//! Installation strategy selection.
//!
//! Exactly one strategy is chosen per run, before anything is installed. The
//! choice is a pure function of the descriptor and settings so it can be shown
//! in a dry run and asserted in tests without touching the host.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::EnvironmentDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    #[default]
    Auto,
    Isolated,
    Colocated,
    System,
}

impl StrategyPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Isolated => "isolated",
            Self::Colocated => "colocated",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallStrategy {
    /// Install into a virtual environment, creating it first when `create` is set.
    Isolated { venv_dir: PathBuf, create: bool },
    /// `pip install --target` next to the application code.
    Colocated {
        target_dir: PathBuf,
        break_system_packages: bool,
    },
    /// Install into the interpreter's own site-packages.
    System { break_system_packages: bool },
}

impl InstallStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Isolated { .. } => "isolated",
            Self::Colocated { .. } => "colocated",
            Self::System { .. } => "system",
        }
    }
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated { venv_dir, create } => write!(
                f,
                "isolated ({}{})",
                venv_dir.display(),
                if *create { ", create" } else { "" }
            ),
            Self::Colocated {
                target_dir,
                break_system_packages,
            } => write!(
                f,
                "colocated ({}{})",
                target_dir.display(),
                if *break_system_packages {
                    ", --break-system-packages"
                } else {
                    ""
                }
            ),
            Self::System {
                break_system_packages,
            } => write!(
                f,
                "system{}",
                if *break_system_packages {
                    " (--break-system-packages)"
                } else {
                    ""
                }
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    pub preference: StrategyPreference,
    /// Absolute venv location (project root already applied).
    pub venv_dir: PathBuf,
    /// Absolute colocated install target.
    pub colocated_target: PathBuf,
    /// Explicit override; `None` lets the selector decide.
    pub break_system_packages: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error(
        "isolated install requested but {interpreter} cannot create virtual environments \
         (venv/ensurepip unavailable) and none exists at {venv_dir}"
    )]
    VenvUnavailable { interpreter: String, venv_dir: String },
    #[error(
        "system install refused: {interpreter} is externally managed; use the isolated or \
         colocated strategy, or set break_system_packages = true"
    )]
    ExternallyManaged { interpreter: String },
}

pub fn select_install_strategy(
    descriptor: &EnvironmentDescriptor,
    settings: &InstallSettings,
) -> Result<InstallStrategy, StrategyError> {
    let existing_venv = descriptor
        .active_virtualenv
        .clone()
        .or_else(|| descriptor.existing_venv.clone());

    match settings.preference {
        StrategyPreference::Auto => {
            if let Some(venv_dir) = existing_venv {
                return Ok(InstallStrategy::Isolated {
                    venv_dir,
                    create: false,
                });
            }
            if descriptor.venv_supported {
                return Ok(InstallStrategy::Isolated {
                    venv_dir: settings.venv_dir.clone(),
                    create: true,
                });
            }
            if descriptor.externally_managed {
                return Ok(InstallStrategy::Colocated {
                    target_dir: settings.colocated_target.clone(),
                    break_system_packages: settings.break_system_packages.unwrap_or(true),
                });
            }
            Ok(InstallStrategy::System {
                break_system_packages: settings.break_system_packages.unwrap_or(false),
            })
        }
        StrategyPreference::Isolated => {
            if let Some(venv_dir) = existing_venv {
                return Ok(InstallStrategy::Isolated {
                    venv_dir,
                    create: false,
                });
            }
            if !descriptor.venv_supported {
                return Err(StrategyError::VenvUnavailable {
                    interpreter: descriptor.interpreter.display().to_string(),
                    venv_dir: settings.venv_dir.display().to_string(),
                });
            }
            Ok(InstallStrategy::Isolated {
                venv_dir: settings.venv_dir.clone(),
                create: true,
            })
        }
        StrategyPreference::Colocated => Ok(InstallStrategy::Colocated {
            target_dir: settings.colocated_target.clone(),
            break_system_packages: settings
                .break_system_packages
                .unwrap_or(descriptor.externally_managed),
        }),
        StrategyPreference::System => {
            let break_system_packages = settings.break_system_packages.unwrap_or(false);
            if descriptor.externally_managed && !break_system_packages {
                return Err(StrategyError::ExternallyManaged {
                    interpreter: descriptor.interpreter.display().to_string(),
                });
            }
            Ok(InstallStrategy::System {
                break_system_packages,
            })
        }
    }
}
