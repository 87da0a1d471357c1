//! Process transport for channel commands.
//!
//! A [`Transport`] runs one external tool invocation. The production
//! implementation, [`ProcessTransport`], spawns the tool as a child process;
//! tests substitute a scripted transport to observe every invocation.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::ChannelError;

/// Interval between exit checks while streaming.
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the tool exited with status zero.
    pub success: bool,
    /// Exit code, if the tool exited normally.
    pub code: Option<i32>,
    /// Combined stdout and stderr, lossily decoded as UTF-8.
    pub output: String,
}

impl CommandOutput {
    /// Creates a successful output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            output: output.into(),
        }
    }

    /// Creates a failed output with the given exit code.
    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            output: output.into(),
        }
    }
}

/// How a streaming command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The tool exited on its own.
    Exited(Option<i32>),
    /// The caller cancelled; the child was killed and reaped.
    Cancelled,
}

/// Executes external tool invocations.
///
/// Implementations must be usable from any thread. Calls block until the
/// tool finishes (or, for [`Transport::stream`], until cancellation).
pub trait Transport: Send + Sync {
    /// Runs `program` with `args` and captures its combined output.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ChannelError>;

    /// Runs `program` with `args`, letting it write straight to the
    /// caller's stdout/stderr until it exits or `cancel` fires.
    fn stream(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, ChannelError>;
}

/// Transport backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessTransport;

impl ProcessTransport {
    /// Creates a new process transport.
    pub fn new() -> Self {
        Self
    }

    /// Resolves a tool name or path to an executable.
    fn resolve(program: &str) -> Result<PathBuf, ChannelError> {
        which::which(program).map_err(|e| ChannelError::ToolUnavailable {
            tool: program.to_string(),
            reason: e.to_string(),
        })
    }

    fn spawn_error(program: &str, err: std::io::Error) -> ChannelError {
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => ChannelError::ToolUnavailable {
                tool: program.to_string(),
                reason: err.to_string(),
            },
            _ => ChannelError::Io(err.to_string()),
        }
    }
}

impl Transport for ProcessTransport {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ChannelError> {
        let path = Self::resolve(program)?;

        let output = Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Self::spawn_error(program, e))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: combined,
        })
    }

    fn stream(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, ChannelError> {
        let path = Self::resolve(program)?;

        let mut child = Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Self::spawn_error(program, e))?;

        loop {
            if cancel.is_cancelled() {
                // kill() fails with InvalidInput once the child has exited
                if let Err(e) = child.kill() {
                    if e.kind() != ErrorKind::InvalidInput {
                        tracing::warn!(program, error = %e, "Failed to kill streaming child");
                    }
                }
                child.wait().map_err(|e| ChannelError::Io(e.to_string()))?;
                tracing::debug!(program, "Streaming command cancelled");
                return Ok(StreamEnd::Cancelled);
            }

            match child.try_wait() {
                Ok(Some(status)) => return Ok(StreamEnd::Exited(status.code())),
                Ok(None) => std::thread::sleep(STREAM_POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ChannelError::Io(e.to_string()));
                }
            }
        }
    }
}
