//! Device records and enumeration.
//!
//! Devices are never cached: every listing is re-derived from a fresh
//! query, since connection state is live.

pub mod enumerator;
pub mod lease;

use serde::{Serialize, Serializer};

use crate::channel::ChannelKind;

pub use enumerator::{enumerate, parse_device_listing, select_device};
pub use lease::{DeviceLease, DeviceLeases};

/// Connection or lock state of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Shell channel: connected and authorized (`device`).
    Online,
    /// Shell channel: connected, debugging not yet authorized.
    Unauthorized,
    /// Shell channel: known but not responding.
    Offline,
    /// Shell channel: any other state token, kept verbatim.
    Unknown(String),
    /// Bootloader channel: bootloader locked.
    Locked,
    /// Bootloader channel: bootloader unlocked.
    Unlocked,
}

impl DeviceState {
    /// Maps a shell listing state token.
    pub fn from_shell_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Online,
            "unauthorized" => DeviceState::Unauthorized,
            "offline" => DeviceState::Offline,
            other => DeviceState::Unknown(other.to_string()),
        }
    }

    /// Maps a bootloader `unlocked` variable; only `yes` means unlocked.
    pub fn from_unlock_flag(value: &str) -> Self {
        if value == "yes" {
            DeviceState::Unlocked
        } else {
            DeviceState::Locked
        }
    }

    /// Returns the state token as the tools print it.
    pub fn as_str(&self) -> &str {
        match self {
            DeviceState::Online => "device",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Offline => "offline",
            DeviceState::Unknown(token) => token,
            DeviceState::Locked => "locked",
            DeviceState::Unlocked => "unlocked",
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeviceState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One attached device as reported by a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Serial number, unique within one channel listing.
    pub serial: String,
    /// Connection or lock state.
    pub state: DeviceState,
    /// Model name, when reported.
    pub model: Option<String>,
    /// Product name, when reported.
    pub product: Option<String>,
    /// Channel the device was found on.
    pub channel: ChannelKind,
    /// Shell channel only: true iff the state token is `device`.
    pub authorized: bool,
}

impl Device {
    /// Short human-readable label: model if known, else product, else serial.
    pub fn label(&self) -> &str {
        self.model
            .as_deref()
            .or(self.product.as_deref())
            .unwrap_or(&self.serial)
    }
}
