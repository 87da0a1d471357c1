//! Channel abstraction over the device-control tools.
//!
//! Two channel kinds are supported:
//!
//! - **Shell** (`adb`): talks to a device running its normal OS. Every call
//!   may be addressed with `-s <serial>`; shell commands are wrapped behind
//!   the single `shell` verb.
//! - **Bootloader** (`fastboot`): talks to the one unit sitting in
//!   bootloader mode. Verbs are issued directly and no serial is passed.
//!
//! All calls are synchronous. A non-zero exit becomes
//! [`ChannelError::CommandFailed`] carrying the captured output; nothing is
//! retried.

pub mod transport;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ToolsConfig;

pub use transport::{CommandOutput, ProcessTransport, StreamEnd, Transport};

/// Channel errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The backing executable could not be found or started.
    #[error("{tool} is unavailable: {reason}")]
    ToolUnavailable {
        /// Tool name or path.
        tool: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// The tool ran and exited non-zero.
    #[error("`{command}` failed (exit {}): {}", exit_label(.code), .output.trim())]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit code, if any.
        code: Option<i32>,
        /// Captured combined output.
        output: String,
    },

    /// Other process I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Which transport a command goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Normal-OS transport (`adb`).
    Shell,
    /// Bootloader transport (`fastboot`).
    Bootloader,
}

impl ChannelKind {
    /// Returns the lowercase name of this channel kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Shell => "shell",
            ChannelKind::Bootloader => "bootloader",
        }
    }

    /// Arguments for the version probe of this channel's tool.
    fn version_args(&self) -> &'static [&'static str] {
        match self {
            ChannelKind::Shell => &["version"],
            ChannelKind::Bootloader => &["--version"],
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The channel abstraction: routes commands to the right tool with the
/// right argument grammar.
pub struct Channel<T: Transport = ProcessTransport> {
    transport: T,
    shell_tool: String,
    bootloader_tool: String,
    shell_version: OnceLock<String>,
    bootloader_version: OnceLock<String>,
}

impl Channel<ProcessTransport> {
    /// Creates a channel that spawns the configured tools.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::with_transport(ProcessTransport::new(), tools)
    }
}

impl<T: Transport> Channel<T> {
    /// Creates a channel over an arbitrary transport.
    pub fn with_transport(transport: T, tools: &ToolsConfig) -> Self {
        Self {
            transport,
            shell_tool: tools.adb.clone(),
            bootloader_tool: tools.fastboot.clone(),
            shell_version: OnceLock::new(),
            bootloader_version: OnceLock::new(),
        }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the tool backing `kind`.
    pub fn tool(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::Shell => &self.shell_tool,
            ChannelKind::Bootloader => &self.bootloader_tool,
        }
    }

    /// Builds the full argument vector for `kind`.
    ///
    /// The bootloader channel addresses a single unit, so `serial` is
    /// dropped there.
    pub fn argv(&self, kind: ChannelKind, serial: Option<&str>, args: &[&str]) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 2);
        if let (ChannelKind::Shell, Some(serial)) = (kind, serial) {
            argv.push("-s".to_string());
            argv.push(serial.to_string());
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    /// Confirms the tool backing `kind` is reachable.
    ///
    /// Returns the first line of the tool's version output. Any failure,
    /// including a non-zero exit, is reported as
    /// [`ChannelError::ToolUnavailable`]. A successful version is cached for
    /// the life of the channel; failures are not.
    pub fn probe(&self, kind: ChannelKind) -> Result<String, ChannelError> {
        let cache = match kind {
            ChannelKind::Shell => &self.shell_version,
            ChannelKind::Bootloader => &self.bootloader_version,
        };
        if let Some(version) = cache.get() {
            return Ok(version.clone());
        }

        let tool = self.tool(kind);
        let args: Vec<String> = kind.version_args().iter().map(|a| a.to_string()).collect();

        let out = self.transport.run(tool, &args)?;
        if !out.success {
            return Err(ChannelError::ToolUnavailable {
                tool: tool.to_string(),
                reason: format!("version probe exited with {:?}", out.code),
            });
        }

        let version = out.output.lines().next().unwrap_or_default().trim().to_string();
        info!(channel = %kind, tool, version = %version, "Tool available");
        Ok(cache.get_or_init(|| version).clone())
    }

    /// Executes `args` on `kind`, optionally addressed to `serial`.
    ///
    /// Returns the combined output on success.
    pub fn execute(
        &self,
        kind: ChannelKind,
        serial: Option<&str>,
        args: &[&str],
    ) -> Result<String, ChannelError> {
        let tool = self.tool(kind);
        let argv = self.argv(kind, serial, args);
        let command = format_command(tool, &argv);
        debug!(channel = %kind, command = %command, "Executing");

        let out = self.transport.run(tool, &argv)?;
        if out.success {
            Ok(out.output)
        } else {
            debug!(channel = %kind, code = ?out.code, "Command failed");
            Err(ChannelError::CommandFailed {
                command,
                code: out.code,
                output: out.output,
            })
        }
    }

    // Shell channel verbs

    /// Runs `command` through the `shell` verb.
    pub fn shell(&self, serial: Option<&str>, command: &str) -> Result<String, ChannelError> {
        self.execute(ChannelKind::Shell, serial, &["shell", command])
    }

    /// Reads one system property, trimmed.
    pub fn getprop(&self, serial: Option<&str>, name: &str) -> Result<String, ChannelError> {
        self.shell(serial, &format!("getprop {}", name))
            .map(|out| out.trim().to_string())
    }

    /// Lists installed package names (`pm list packages`).
    pub fn packages(&self, serial: Option<&str>) -> Result<Vec<String>, ChannelError> {
        self.shell(serial, "pm list packages")
            .map(|out| parse_package_list(&out))
    }

    /// Lists attached devices (`devices -l`), raw.
    pub fn list_devices_raw(&self, kind: ChannelKind) -> Result<String, ChannelError> {
        match kind {
            ChannelKind::Shell => self.execute(kind, None, &["devices", "-l"]),
            ChannelKind::Bootloader => self.execute(kind, None, &["devices"]),
        }
    }

    /// Copies a local file to the device.
    pub fn push(&self, serial: Option<&str>, local: &str, remote: &str) -> Result<String, ChannelError> {
        self.execute(ChannelKind::Shell, serial, &["push", local, remote])
    }

    /// Copies a device file to the host.
    pub fn pull(&self, serial: Option<&str>, remote: &str, local: &str) -> Result<String, ChannelError> {
        self.execute(ChannelKind::Shell, serial, &["pull", remote, local])
    }

    /// Reboots the device, optionally into `mode` (e.g. `bootloader`).
    pub fn reboot(&self, serial: Option<&str>, mode: Option<&str>) -> Result<String, ChannelError> {
        match mode {
            Some(mode) => self.execute(ChannelKind::Shell, serial, &["reboot", mode]),
            None => self.execute(ChannelKind::Shell, serial, &["reboot"]),
        }
    }

    /// Starts the host-side server.
    pub fn start_server(&self) -> Result<String, ChannelError> {
        self.execute(ChannelKind::Shell, None, &["start-server"])
    }

    /// Stops the host-side server.
    pub fn kill_server(&self) -> Result<String, ChannelError> {
        self.execute(ChannelKind::Shell, None, &["kill-server"])
    }

    /// Streams the device log to the caller's stdout until `cancel` fires
    /// or the tool exits.
    pub fn logcat(
        &self,
        serial: Option<&str>,
        filter: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StreamEnd, ChannelError> {
        let mut args = vec!["logcat"];
        if let Some(filter) = filter {
            args.push("-s");
            args.push(filter);
        }

        let tool = self.tool(ChannelKind::Shell);
        let argv = self.argv(ChannelKind::Shell, serial, &args);
        debug!(command = %format_command(tool, &argv), "Streaming");
        self.transport.stream(tool, &argv, cancel)
    }

    // Bootloader channel verbs

    /// Queries one bootloader variable and extracts its value.
    ///
    /// Returns `Ok(None)` when the tool succeeded but printed no value.
    pub fn getvar(&self, name: &str) -> Result<Option<String>, ChannelError> {
        self.execute(ChannelKind::Bootloader, None, &["getvar", name])
            .map(|out| parse_var(&out, name))
    }

    /// Requests a bootloader unlock (`oem unlock`).
    pub fn oem_unlock(&self) -> Result<String, ChannelError> {
        self.execute(ChannelKind::Bootloader, None, &["oem", "unlock"])
    }

    /// Reboots the unit into emergency download mode.
    ///
    /// Tries `oem edl` first and falls back to `reboot edl` when the
    /// bootloader rejects it.
    pub fn enter_edl(&self) -> Result<String, ChannelError> {
        match self.execute(ChannelKind::Bootloader, None, &["oem", "edl"]) {
            Ok(out) => Ok(out),
            Err(ChannelError::CommandFailed { .. }) => {
                debug!("oem edl rejected, trying reboot edl");
                self.execute(ChannelKind::Bootloader, None, &["reboot", "edl"])
            }
            Err(e) => Err(e),
        }
    }
}

/// Extracts package names from `pm list packages` output.
///
/// Only `package:<name>` lines count; warnings, blank lines and anything
/// else the package manager prints are skipped.
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts `name`'s value from `name: value` lines.
///
/// Bootloader tools print variables on stderr, sometimes behind a
/// `(bootloader) ` prefix. Lines that do not match are ignored; an empty
/// value counts as absent.
pub fn parse_var(output: &str, name: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let line = line.trim();
        let line = line.strip_prefix("(bootloader)").map_or(line, str::trim_start);
        let value = line.strip_prefix(name)?.strip_prefix(':')?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

fn format_command(tool: &str, argv: &[String]) -> String {
    std::iter::once(tool)
        .chain(argv.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
