//! Configuration management for devbridge.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/devbridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inspect::PropertyProfile;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tools.{0} must not be empty")]
    EmptyToolName(&'static str),

    #[error("inspect.profile must be one of: {known}; got {got}")]
    UnknownProfile { got: String, known: String },

    #[error("gate.payload_dir is not a directory: {0}")]
    InvalidPayloadDir(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Immutable program identity handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppInfo {
    /// Program name.
    pub name: &'static str,
    /// Program version.
    pub version: &'static str,
}

impl AppInfo {
    /// Returns the identity of this build.
    pub const fn current() -> Self {
        Self {
            name: "devbridge",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl std::fmt::Display for AppInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Main configuration structure for devbridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// External tool locations.
    pub tools: ToolsConfig,

    /// Property inspection settings.
    pub inspect: InspectConfig,

    /// Credential gate settings.
    pub gate: GateConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// External tool locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Shell channel tool, as a name looked up in PATH or a path.
    pub adb: String,

    /// Bootloader channel tool, as a name looked up in PATH or a path.
    pub fastboot: String,
}

/// Property inspection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InspectConfig {
    /// Default property profile.
    pub profile: String,
}

/// Credential gate settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Directory holding operator-sealed `<operation>.payload` files.
    /// When unset, the bundled payloads are used.
    pub payload_dir: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Optional log file, written in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            adb: "adb".to_string(),
            fastboot: "fastboot".to_string(),
        }
    }
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            profile: "generic".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("devbridge")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - DEVBRIDGE_ADB: Override the shell channel tool
    /// - DEVBRIDGE_FASTBOOT: Override the bootloader channel tool
    /// - DEVBRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(adb) = std::env::var("DEVBRIDGE_ADB") {
            if !adb.is_empty() {
                tracing::info!("Overriding tools.adb from environment: {}", adb);
                self.tools.adb = adb;
            }
        }

        if let Ok(fastboot) = std::env::var("DEVBRIDGE_FASTBOOT") {
            if !fastboot.is_empty() {
                tracing::info!("Overriding tools.fastboot from environment: {}", fastboot);
                self.tools.fastboot = fastboot;
            }
        }

        if let Ok(level) = std::env::var("DEVBRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Tool reachability is not checked here; that is the job of the
    /// startup version probe.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tools.adb.trim().is_empty() {
            return Err(ConfigError::EmptyToolName("adb"));
        }
        if self.tools.fastboot.trim().is_empty() {
            return Err(ConfigError::EmptyToolName("fastboot"));
        }

        if PropertyProfile::by_name(&self.inspect.profile).is_none() {
            return Err(ConfigError::UnknownProfile {
                got: self.inspect.profile.clone(),
                known: PropertyProfile::names().join(", "),
            });
        }

        if let Some(dir) = &self.gate.payload_dir {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidPayloadDir(dir.display().to_string()));
            }
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
