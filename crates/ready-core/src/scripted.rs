//! Scripted [`CommandRunner`] for tests.
//!
//! Compiled for this crate's own tests and for dependents that enable the
//! `test-support` feature; release builds of the binary never contain it.

use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::process::{CommandOutcome, CommandRunner, CommandSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Success { stdout: String },
    Failure { exit_code: i32, stderr: String },
    SpawnError { message: String },
}

impl ScriptedResponse {
    pub fn ok() -> Self {
        Self::Success {
            stdout: String::new(),
        }
    }

    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Success {
            stdout: stdout.into(),
        }
    }

    pub fn fail(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::Failure {
            exit_code,
            stderr: stderr.into(),
        }
    }
}

type ScriptedEffect = Box<dyn Fn(&CommandSpec) -> Result<()> + Send + Sync>;

struct ScriptedRule {
    pattern: String,
    response: ScriptedResponse,
    effect: Option<ScriptedEffect>,
}

/// Test-only runner that never spawns a process.
///
/// Each call is recorded. The first rule whose pattern is a substring of the
/// command's display line decides the response; unmatched commands succeed
/// with empty output.
#[derive(Default)]
pub struct ScriptedCommandRunner {
    rules: Vec<ScriptedRule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: impl Into<String>, response: ScriptedResponse) -> Self {
        self.rules.push(ScriptedRule {
            pattern: pattern.into(),
            response,
            effect: None,
        });
        self
    }

    /// Like [`Self::respond`], additionally running `effect` before answering.
    pub fn respond_with_effect<F>(
        mut self,
        pattern: impl Into<String>,
        response: ScriptedResponse,
        effect: F,
    ) -> Self
    where
        F: Fn(&CommandSpec) -> Result<()> + Send + Sync + 'static,
    {
        self.rules.push(ScriptedRule {
            pattern: pattern.into(),
            response,
            effect: Some(Box::new(effect)),
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_lines(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(CommandSpec::display_line)
            .collect()
    }
}

impl CommandRunner for ScriptedCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let line = spec.display_line();
        let Some(rule) = self
            .rules
            .iter()
            .find(|rule| line.contains(rule.pattern.as_str()))
        else {
            return Ok(CommandOutcome::succeeded(""));
        };
        if let Some(effect) = &rule.effect {
            effect(spec)?;
        }
        match &rule.response {
            ScriptedResponse::Success { stdout } => Ok(CommandOutcome::succeeded(stdout.clone())),
            ScriptedResponse::Failure { exit_code, stderr } => {
                Ok(CommandOutcome::failed(*exit_code, stderr.clone()))
            }
            ScriptedResponse::SpawnError { message } => {
                Err(anyhow!("failed to spawn `{line}`: {message}"))
            }
        }
    }
}
