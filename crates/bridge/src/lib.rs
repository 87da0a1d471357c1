//! # devbridge Bridge Library
//!
//! This crate drives Android devices through their host-side debug tools
//! and guards irreversible operations behind the credential gate.
//!
//! ## Overview
//!
//! - **Channels**: one abstraction over the shell transport (`adb`) and the
//!   bootloader transport (`fastboot`), with a pluggable process layer
//! - **Devices**: enumeration from tool listings, selection, and exclusive
//!   leases
//! - **Inspection**: data-driven security property profiles, degrading to
//!   `N/A` instead of failing
//! - **Gated Operations**: a state machine that refuses to issue a single
//!   device command until a credential has authenticated the payload
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    devbridge CLI                      │
//! ├───────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌────────────┐  ┌─────────────────┐  │
//! │  │  Devices   │  │  Inspect   │  │ Gated Operation │  │
//! │  │  + Leases  │  │  Profiles  │  │  (gate crate)   │  │
//! │  └────────────┘  └────────────┘  └─────────────────┘  │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │          Channel (shell | bootloader)           │  │
//! │  └─────────────────────────────────────────────────┘  │
//! │  ┌─────────────────────────────────────────────────┐  │
//! │  │         Transport (child processes)             │  │
//! │  └─────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bridge::{select_device, Channel, ChannelKind, Config, DeviceLeases, GatedOperation, OperationKind};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let channel = Channel::from_config(&config.tools);
//!
//!     let kind = OperationKind::BootloaderUnlock;
//!     let device = select_device(&channel, kind.target_channel(), None)?;
//!     let leases = DeviceLeases::new();
//!     let lease = leases.acquire(device)?;
//!
//!     let result = GatedOperation::new(&channel, kind).run(&lease, Some("00112233..."));
//!     println!("{:?}", result.outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: Tool invocation and argument grammar
//! - [`config`]: Configuration loading and defaults
//! - [`devices`]: Enumeration, selection, leases
//! - [`inspect`]: Security property profiles
//! - [`operation`]: Credential-gated operations and command plans
//! - [`error`]: Error types

pub mod channel;
pub mod config;
pub mod devices;
pub mod error;
pub mod inspect;
pub mod operation;

// Re-export the gate for convenience
pub use gate;

pub use channel::transport::{CommandOutput, ProcessTransport, StreamEnd, Transport};
pub use channel::{parse_package_list, parse_var, Channel, ChannelError, ChannelKind};
pub use config::{AppInfo, Config};
pub use devices::{
    enumerate, parse_device_listing, select_device, Device, DeviceLease, DeviceLeases, DeviceState,
};
pub use error::{BridgeError, Result};
pub use inspect::{inspect, PropertyProfile, PropertyValue, SecurityStatus, NOT_AVAILABLE};
pub use operation::{
    seal_plan, CommandPlan, FailureReason, GateState, GatedOperation, OperationKind,
    OperationResult, Outcome, PlanStep, StepId,
};
