//! Exclusive device ownership.
//!
//! A device's channel is a serialized resource. [`DeviceLeases`] hands out
//! at most one [`DeviceLease`] per device at a time; the lease is returned
//! when dropped.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::Device;
use crate::error::{BridgeError, Result};

/// Registry of devices currently held by an operation.
///
/// Leases are exclusive only among holders of the same registry (clones
/// share it). Two separate `devbridge` processes each build their own
/// registry and are not serialized against each other.
#[derive(Debug, Clone, Default)]
pub struct DeviceLeases {
    held: Arc<DashMap<String, ()>>,
}

impl DeviceLeases {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes exclusive ownership of `device`.
    ///
    /// Fails with [`BridgeError::DeviceBusy`] if another lease on the same
    /// device is still alive.
    pub fn acquire(&self, device: Device) -> Result<DeviceLease> {
        let key = lease_key(&device);
        match self.held.entry(key.clone()) {
            Entry::Occupied(_) => Err(BridgeError::DeviceBusy(device.serial)),
            Entry::Vacant(slot) => {
                slot.insert(());
                tracing::debug!(device = %key, "Lease acquired");
                Ok(DeviceLease {
                    held: Arc::clone(&self.held),
                    key,
                    device,
                })
            }
        }
    }

    /// Returns true if `device` is currently leased.
    pub fn is_held(&self, device: &Device) -> bool {
        self.held.contains_key(&lease_key(device))
    }

    /// Number of leases currently alive.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns true if no device is leased.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

fn lease_key(device: &Device) -> String {
    format!("{}:{}", device.channel, device.serial)
}

/// Proof of exclusive ownership of one device.
#[derive(Debug)]
pub struct DeviceLease {
    held: Arc<DashMap<String, ()>>,
    key: String,
    device: Device,
}

impl DeviceLease {
    /// The leased device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.held.remove(&self.key);
        tracing::debug!(device = %self.key, "Lease released");
    }
}
