//! External command execution behind a swappable runner.
//!
//! Every phase reaches pip, the interpreter, and the framework's management
//! commands through [`CommandRunner`]. A spawn failure is an `Err`; a process
//! that ran and exited non-zero is an `Ok` outcome with `success == false` so
//! callers decide whether that is fatal.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use wait_timeout::ChildExt;

use crate::time_utils::elapsed_ms;

const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Single-line rendering used in progress output, logs, and scripted matching.
    pub fn display_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(quote_for_display(&self.program.display().to_string()));
        parts.extend(self.args.iter().map(|arg| quote_for_display(arg)));
        parts.join(" ")
    }
}

fn quote_for_display(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_./=:@+,".contains(ch))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutcome {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: false,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Converts a non-zero exit into an error carrying the tail of stderr.
    pub fn ensure_success(self, spec: &CommandSpec) -> Result<Self> {
        if self.success {
            return Ok(self);
        }
        let code = self
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let tail = output_tail(&self.stderr, OUTPUT_TAIL_LINES);
        let tail = if tail.is_empty() {
            output_tail(&self.stdout, OUTPUT_TAIL_LINES)
        } else {
            tail
        };
        if tail.is_empty() {
            bail!("`{}` exited with status {code}", spec.display_line());
        }
        bail!(
            "`{}` exited with status {code}:\n{tail}",
            spec.display_line()
        );
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Returns at most the last `max_lines` non-empty lines of `output`.
pub fn output_tail(output: &str, max_lines: usize) -> String {
    let lines = output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        (**self).run(spec)
    }
}

/// Runs commands as real child processes, capturing stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(command = %spec.display_line(), "spawning");
        let started = Instant::now();
        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", spec.display_line()))?;

        let (exit_code, success, stdout, stderr) = match spec.timeout {
            None => {
                let output = child.wait_with_output().with_context(|| {
                    format!("failed to collect output of `{}`", spec.display_line())
                })?;
                (
                    output.status.code(),
                    output.status.success(),
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                )
            }
            Some(timeout) => wait_with_timeout(child, timeout, spec)?,
        };

        Ok(CommandOutcome {
            exit_code,
            success,
            stdout,
            stderr,
            duration_ms: elapsed_ms(started),
        })
    }
}

type TimedOutput = (Option<i32>, bool, String, String);

fn wait_with_timeout(
    mut child: Child,
    timeout: Duration,
    spec: &CommandSpec,
) -> Result<TimedOutput> {
    // Pipes are drained on their own threads so a chatty child cannot block on a
    // full pipe while we wait on its exit.
    let stdout_reader = drain_in_background(child.stdout.take());
    let stderr_reader = drain_in_background(child.stderr.take());

    let status = child
        .wait_timeout(timeout)
        .with_context(|| format!("failed while waiting for `{}`", spec.display_line()))?;
    let Some(status) = status else {
        let _ = child.kill();
        let _ = child.wait();
        bail!(
            "`{}` timed out after {} s",
            spec.display_line(),
            timeout.as_secs()
        );
    };

    let stdout = join_reader(stdout_reader)?;
    let stderr = join_reader(stderr_reader)?;
    Ok((status.code(), status.success(), stdout, stderr))
}

fn drain_in_background<R>(pipe: Option<R>) -> Option<std::thread::JoinHandle<String>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> Result<String> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("output reader thread panicked")),
        None => Ok(String::new()),
    }
}
