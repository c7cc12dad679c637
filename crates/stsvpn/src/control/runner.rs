//! Invocation of the daemon's control binary.

use std::future::Future;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

/// Result of one finished CLI invocation.
///
/// Output is split into lines; blank lines are dropped so that "last line"
/// always means the last line with content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Last non-blank stderr line, used as the operator-facing failure reason.
    pub fn last_stderr_line(&self) -> Option<&str> {
        self.stderr.last().map(String::as_str)
    }

    /// Build from captured text, dropping blank lines.
    pub fn from_text(exit_code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: split_lines(stdout),
            stderr: split_lines(stderr),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self::from_text(
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Why a command produced no [`CommandOutput`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("could not execute {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("no answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Runs the daemon CLI with the given arguments.
///
/// The production implementation is [`ProcessRunner`]; tests substitute
/// scripted runners.
pub trait CommandRunner {
    fn run(&self, args: &[&str]) -> impl Future<Output = Result<CommandOutput, RunError>> + Send;
}

/// Spawns the control binary as a child process with a hard timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary: PathBuf,
    timeout: Duration,
}

impl ProcessRunner {
    pub const fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self { binary, timeout }
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, RunError> {
        let cmd_line = format!("{} {}", self.binary.display(), args.join(" "));
        tracing::debug!("exec: {cmd_line}");

        let spawn_err = |source| RunError::Spawn {
            program: self.binary.display().to_string(),
            source,
        };

        // The status parser depends on English output.
        let child = Command::new(&self.binary)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        // On timeout the child is dropped, and with it killed.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "timed out: {cmd_line}");
                RunError::Timeout(self.timeout)
            })?
            .map_err(spawn_err)?;

        let output = CommandOutput::from(output);
        tracing::debug!(
            exit_code = ?output.exit_code,
            stdout_lines = output.stdout.len(),
            stderr_lines = output.stderr.len(),
            "finished: {cmd_line}"
        );
        Ok(output)
    }
}
