//! Error types for the bridge crate.

use gate::GateError;
use thiserror::Error;

use crate::channel::{ChannelError, ChannelKind};

/// Bridge error type for device selection and I/O.
///
/// Credential and payload refusals are not errors at this level: a gated
/// operation always completes with an [`OperationResult`](crate::operation::OperationResult).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A channel command could not be run or failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A credential or payload was refused outside a gated run.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// No device is attached on the channel.
    #[error("no {0} device attached")]
    NoDevice(ChannelKind),

    /// Several devices are attached and none was chosen.
    #[error("{count} devices attached; specify one with --serial")]
    AmbiguousDevice {
        /// Number of attached devices.
        count: usize,
    },

    /// The requested serial is not attached.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Another operation holds the device.
    #[error("device busy: {0} is held by another operation")]
    DeviceBusy(String),

    /// A payload file could not be loaded.
    #[error("failed to load payload {path}: {reason}")]
    PayloadFile {
        /// Path to the payload file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A command plan could not be built.
    #[error("invalid command plan: {0}")]
    InvalidPlan(String),

    /// An unrecognized operation name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
