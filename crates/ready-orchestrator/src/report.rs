//! Run report persisted after every non-dry run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use ready_core::write_text_atomic;
use ready_env::InstallStrategy;

use crate::phase::{Phase, PhasePolicy};

pub const RUN_REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Ok,
    Skipped,
    Warning,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Warning => "warning",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseOutcome {
    pub phase: Phase,
    pub policy: PhasePolicy,
    pub status: PhaseStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Unbootstrapped,
    Ready,
    Failed { phase: Phase },
}

impl RunState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapReport {
    pub schema_version: u32,
    pub started_unix_ms: u64,
    pub finished_unix_ms: u64,
    pub project_root: PathBuf,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<InstallStrategy>,
    pub phases: Vec<PhaseOutcome>,
    #[serde(flatten)]
    pub state: RunState,
}

impl BootstrapReport {
    pub fn outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|outcome| outcome.phase == phase)
    }

    /// Process exit status: 0 when ready (or a dry run resolved its plan), 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Ready => 0,
            RunState::Unbootstrapped if self.dry_run => 0,
            _ => 1,
        }
    }
}

pub fn write_run_report(path: &Path, report: &BootstrapReport) -> Result<()> {
    let mut payload =
        serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    payload.push('\n');
    write_text_atomic(path, &payload)
        .with_context(|| format!("failed to write run report {}", path.display()))
}
