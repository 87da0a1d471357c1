//! devbridge
//!
//! Command-line driver for the device bridge.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use bridge::config::LoggingConfig;
use bridge::gate::Credential;
use bridge::inspect::PropertyProfile;
use bridge::operation::{load_payload_file, payload_for};
use bridge::{
    inspect, seal_plan, select_device, AppInfo, Channel, ChannelKind, CommandPlan, Config,
    DeviceLeases, GatedOperation, OperationKind, Outcome, StreamEnd,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use zeroize::Zeroizing;

/// devbridge - drive Android devices over adb and fastboot.
#[derive(Parser, Debug)]
#[command(name = "devbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List attached devices
    Devices {
        /// List units in bootloader mode instead
        #[arg(long)]
        bootloader: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Read a device's security properties
    Inspect {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Property profile (defaults to the configured one)
        #[arg(long)]
        profile: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List packages installed on the device
    Packages {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run a shell command on the device
    Shell {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Copy a file to the device
    Push {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Local file
        local: PathBuf,

        /// Destination on the device
        remote: String,
    },

    /// Copy a file from the device
    Pull {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Source on the device
        remote: String,

        /// Local destination
        local: PathBuf,
    },

    /// Reboot the device
    Reboot {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Reboot target (bootloader, recovery, ...)
        mode: Option<String>,
    },

    /// Control the shell transport's host server
    #[command(subcommand)]
    Server(ServerCommands),

    /// Stream the device log until interrupted
    Logcat {
        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Log filter spec, e.g. `ActivityManager:I *:S`
        #[arg(long)]
        filter: Option<String>,
    },

    /// Put the bootloader unit into emergency download mode
    Edl,

    /// Run a credential-gated operation
    Run {
        /// Operation name (bootloader-unlock, vendor-unlock)
        #[arg(value_parser = parse_operation)]
        operation: OperationKind,

        /// Device serial
        #[arg(short, long)]
        serial: Option<String>,

        /// Hex-encoded 256-bit key
        #[arg(long, value_name = "HEX")]
        key: Option<String>,

        /// Sealed payload file (base64)
        #[arg(long, value_name = "FILE")]
        payload: Option<PathBuf>,
    },

    /// Seal a command plan into a payload file
    Seal {
        /// Operation the payload is for
        #[arg(value_parser = parse_operation)]
        operation: OperationKind,

        /// JSON command plan
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,

        /// Hex-encoded 256-bit key
        #[arg(long, value_name = "HEX")]
        key: String,

        /// Output payload file
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

/// Subcommands for the host server.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommands {
    /// Start the server
    Start,
    /// Stop the server
    Stop,
}

fn parse_operation(s: &str) -> Result<OperationKind, bridge::BridgeError> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    let _guard = match init_logging(&level, &config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let app = AppInfo::current();
    tracing::debug!(app = %app, "Starting");

    match execute(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Installs the stderr subscriber, plus a file layer when configured.
///
/// The returned guard flushes the file writer; hold it until exit.
fn init_logging(level: &str, logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("logging.file has no file name: {}", path.display()))?;
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

/// The channel a command talks to, if any.
fn required_channel(command: &Commands, config: &Config) -> Option<ChannelKind> {
    match command {
        Commands::Devices { bootloader, .. } => Some(if *bootloader {
            ChannelKind::Bootloader
        } else {
            ChannelKind::Shell
        }),
        Commands::Inspect { profile, .. } => {
            let name = profile.as_deref().unwrap_or(&config.inspect.profile);
            PropertyProfile::by_name(name).map(|p| p.channel)
        }
        Commands::Packages { .. }
        | Commands::Shell { .. }
        | Commands::Push { .. }
        | Commands::Pull { .. }
        | Commands::Reboot { .. }
        | Commands::Server(_)
        | Commands::Logcat { .. } => Some(ChannelKind::Shell),
        Commands::Edl => Some(ChannelKind::Bootloader),
        Commands::Run { operation, .. } => Some(operation.target_channel()),
        Commands::Seal { .. } => None,
    }
}

async fn execute(command: Commands, config: Config) -> anyhow::Result<ExitCode> {
    let channel = Channel::from_config(&config.tools);
    if let Some(kind) = required_channel(&command, &config) {
        channel.probe(kind)?;
    }

    match command {
        Commands::Devices { bootloader, json } => {
            let kind = if bootloader {
                ChannelKind::Bootloader
            } else {
                ChannelKind::Shell
            };
            let devices = bridge::enumerate(&channel, kind)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No {} devices attached.", kind);
            } else {
                for device in &devices {
                    println!("{:<24} {:<14} {}", device.serial, device.state.as_str(), device.label());
                }
            }
        }
        Commands::Inspect {
            serial,
            profile,
            json,
        } => {
            let name = profile.as_deref().unwrap_or(&config.inspect.profile);
            let profile = PropertyProfile::by_name(name).ok_or_else(|| {
                anyhow!(
                    "unknown profile {} (known: {})",
                    name,
                    PropertyProfile::names().join(", ")
                )
            })?;
            let device = select_device(&channel, profile.channel, serial.as_deref())?;
            let status = inspect(&channel, profile, Some(device.serial.as_str()));
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{} ({}), profile {}", device.serial, device.label(), status.profile());
                for (spec, value) in status.iter() {
                    println!("  {:<22} {}", spec.label, value);
                }
            }
        }
        Commands::Packages { serial, json } => {
            let device = select_device(&channel, ChannelKind::Shell, serial.as_deref())?;
            let packages = channel.packages(Some(device.serial.as_str()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&packages)?);
            } else {
                for package in &packages {
                    println!("{}", package);
                }
                println!("{} packages", packages.len());
            }
        }
        Commands::Shell { serial, command } => {
            let device = select_device(&channel, ChannelKind::Shell, serial.as_deref())?;
            let output = channel.shell(Some(device.serial.as_str()), &command.join(" "))?;
            print!("{}", output);
        }
        Commands::Push {
            serial,
            local,
            remote,
        } => {
            let device = select_device(&channel, ChannelKind::Shell, serial.as_deref())?;
            let local = local.to_string_lossy();
            print!("{}", channel.push(Some(device.serial.as_str()), &local, &remote)?);
        }
        Commands::Pull {
            serial,
            remote,
            local,
        } => {
            let device = select_device(&channel, ChannelKind::Shell, serial.as_deref())?;
            let local = local.to_string_lossy();
            print!("{}", channel.pull(Some(device.serial.as_str()), &remote, &local)?);
        }
        Commands::Reboot { serial, mode } => {
            let device = select_device(&channel, ChannelKind::Shell, serial.as_deref())?;
            channel.reboot(Some(device.serial.as_str()), mode.as_deref())?;
            println!("Rebooting {}", device.serial);
        }
        Commands::Server(ServerCommands::Start) => {
            print!("{}", channel.start_server()?);
        }
        Commands::Server(ServerCommands::Stop) => {
            print!("{}", channel.kill_server()?);
        }
        Commands::Logcat { serial, filter } => {
            let device = select_device(&channel, ChannelKind::Shell, serial.as_deref())?;
            let cancel = CancellationToken::new();

            let interrupt = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::info!("Interrupted, stopping log stream");
                        cancel.cancel();
                    }
                })
            };

            let tools = config.tools.clone();
            let end = tokio::task::spawn_blocking(move || {
                Channel::from_config(&tools).logcat(Some(device.serial.as_str()), filter.as_deref(), &cancel)
            })
            .await
            .context("log stream task failed")??;
            interrupt.abort();

            if let StreamEnd::Exited(Some(code)) = end {
                if code != 0 {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Edl => {
            select_device(&channel, ChannelKind::Bootloader, None)?;
            channel.enter_edl()?;
            println!("Entering emergency download mode");
        }
        Commands::Run {
            operation,
            serial,
            key,
            payload,
        } => {
            let key = key.map(Zeroizing::new);
            let payload = match payload {
                Some(path) => load_payload_file(&path)?,
                None => payload_for(operation, config.gate.payload_dir.as_deref())?,
            };

            let device = select_device(&channel, operation.target_channel(), serial.as_deref())?;
            let leases = DeviceLeases::new();
            let lease = leases.acquire(device)?;

            let result = GatedOperation::new(&channel, operation)
                .with_payload(payload)
                .run(&lease, key.as_deref().map(String::as_str));

            match &result.outcome {
                Outcome::Succeeded { steps } => {
                    println!("{} succeeded ({} steps, run {})", operation, steps, result.run_id);
                }
                Outcome::Failed {
                    reason,
                    last_step,
                    detail,
                } => {
                    eprintln!(
                        "{} failed at {}: {} ({}), run {}",
                        operation, last_step, reason, detail, result.run_id
                    );
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Seal {
            operation,
            plan,
            key,
            out,
        } => {
            let key = Zeroizing::new(key);
            let credential = Credential::from_hex(&key)?;
            let text = Zeroizing::new(
                fs::read(&plan)
                    .with_context(|| format!("Failed to read plan: {}", plan.display()))?,
            );
            let plan = CommandPlan::from_json(&text)?;
            let payload = seal_plan(&credential, operation, &plan)?;
            fs::write(&out, format!("{}\n", payload.to_base64()))
                .with_context(|| format!("Failed to write payload: {}", out.display()))?;
            println!(
                "Sealed {} ({} steps) to {} [{}]",
                operation,
                plan.len(),
                out.display(),
                payload.fingerprint()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
