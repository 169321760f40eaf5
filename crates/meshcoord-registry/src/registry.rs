//! Device registry

use chrono::{DateTime, Utc};
use meshcoord_protocol::{IeeeAddr, ShortAddr};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::capability::Feature;
use crate::device::DiscoveredDevice;
use crate::error::{RegistryError, Result};
use crate::lifecycle::Lifecycle;

/// Whether an upsert created or replaced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

/// Filter for [`DeviceRegistry::find`]; empty fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceQuery {
    pub features: BTreeSet<Feature>,
    pub manufacturer_code: Option<u16>,
    pub profile_id: Option<u16>,
    pub device_id: Option<u16>,
    pub ieee_addr: Option<IeeeAddr>,
    pub online: Option<bool>,
}

impl DeviceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.insert(feature);
        self
    }

    pub fn manufacturer_code(mut self, code: u16) -> Self {
        self.manufacturer_code = Some(code);
        self
    }

    pub fn profile_id(mut self, profile_id: u16) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    pub fn device_id(mut self, device_id: u16) -> Self {
        self.device_id = Some(device_id);
        self
    }

    pub fn ieee_addr(mut self, ieee_addr: IeeeAddr) -> Self {
        self.ieee_addr = Some(ieee_addr);
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    fn matches(&self, device: &DiscoveredDevice, offline_after_ms: u64, now_ms: u64) -> bool {
        if let Some(online) = self.online {
            if device.is_online(offline_after_ms, now_ms) != online {
                return false;
            }
        }
        if !self.features.iter().all(|f| device.has_feature(*f)) {
            return false;
        }
        if self.manufacturer_code.is_some() && device.manufacturer_code != self.manufacturer_code {
            return false;
        }
        if self.profile_id.is_some() && device.profile_id() != self.profile_id {
            return false;
        }
        if self.device_id.is_some() && device.device_id() != self.device_id {
            return false;
        }
        if let Some(ieee) = self.ieee_addr {
            if device.ieee_addr != ieee {
                return false;
            }
        }
        true
    }
}

/// One device in a registry snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub device: DiscoveredDevice,
    pub lifecycle: Lifecycle,
}

/// Serializable dump of the registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub generated_at: DateTime<Utc>,
    pub offline_after_ms: u64,
    pub devices: Vec<DeviceSnapshot>,
}

impl RegistrySnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| RegistryError::Serialization(e.to_string()))
    }
}

/// In-memory device registry keyed by short address
///
/// Iteration is always in ascending short address order.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<ShortAddr, DiscoveredDevice>,

    /// Age after which a silent device is reported offline (0 = never)
    offline_after_ms: u64,
}

impl DeviceRegistry {
    pub fn new(offline_after_ms: u64) -> Self {
        DeviceRegistry {
            devices: BTreeMap::new(),
            offline_after_ms,
        }
    }

    pub fn offline_after_ms(&self) -> u64 {
        self.offline_after_ms
    }

    pub fn set_offline_after_ms(&mut self, offline_after_ms: u64) {
        self.offline_after_ms = offline_after_ms;
    }

    /// Insert or replace a device wholesale
    ///
    /// A device that rejoined under a new short address replaces its old
    /// entry; first-seen is carried over from whichever entry it replaces.
    /// Devices without a known IEEE address are only matched by short address.
    pub fn upsert(&mut self, mut device: DiscoveredDevice) -> UpsertOutcome {
        let moved_from = if device.ieee_addr.is_unknown() {
            None
        } else {
            self.devices
                .values()
                .find(|d| d.ieee_addr == device.ieee_addr && d.short_addr != device.short_addr)
                .map(|d| d.short_addr)
        };

        let mut previous = None;
        if let Some(old_addr) = moved_from {
            debug!(
                "Device {} moved from {} to {}",
                device.ieee_addr, old_addr, device.short_addr
            );
            previous = self.devices.remove(&old_addr);
        }
        if let Some(existing) = self.devices.remove(&device.short_addr) {
            previous = Some(existing);
        }

        let outcome = match previous {
            Some(prev) => {
                device.first_seen_ms = device.first_seen_ms.min(prev.first_seen_ms);
                UpsertOutcome::Updated
            }
            None => {
                info!(
                    "Registered device {} ({}) with {} feature(s)",
                    device.short_addr,
                    device.ieee_addr,
                    device.features().len()
                );
                UpsertOutcome::Added
            }
        };

        self.devices.insert(device.short_addr, device);
        outcome
    }

    pub fn get(&self, addr: ShortAddr) -> Option<&DiscoveredDevice> {
        self.devices.get(&addr)
    }

    pub fn get_by_ieee(&self, ieee_addr: &IeeeAddr) -> Option<&DiscoveredDevice> {
        self.devices.values().find(|d| d.ieee_addr == *ieee_addr)
    }

    pub fn contains(&self, addr: ShortAddr) -> bool {
        self.devices.contains_key(&addr)
    }

    pub fn list(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.values()
    }

    pub fn remove(&mut self, addr: ShortAddr) -> Option<DiscoveredDevice> {
        let removed = self.devices.remove(&addr);
        if removed.is_some() {
            info!("Removed device {}", addr);
        }
        removed
    }

    /// First device, by ascending address, that provides `feature`
    pub fn select(&self, feature: Feature) -> Option<&DiscoveredDevice> {
        self.devices.values().find(|d| d.has_feature(feature))
    }

    pub fn find(&self, query: &DeviceQuery, now_ms: u64) -> Vec<&DiscoveredDevice> {
        self.devices
            .values()
            .filter(|d| query.matches(d, self.offline_after_ms, now_ms))
            .collect()
    }

    /// Record that a device was heard from; false if unknown
    pub fn touch(&mut self, addr: ShortAddr, now_ms: u64) -> bool {
        match self.devices.get_mut(&addr) {
            Some(device) => {
                device.touch(now_ms);
                true
            }
            None => false,
        }
    }

    pub fn mark_offline(
        &mut self,
        addr: ShortAddr,
        reason: Option<String>,
        now_ms: u64,
    ) -> Result<Lifecycle> {
        let offline_after_ms = self.offline_after_ms;
        let device = self
            .devices
            .get_mut(&addr)
            .ok_or(RegistryError::DeviceNotFound(addr))?;
        device.mark_offline(reason, now_ms);
        Ok(device.lifecycle(offline_after_ms, now_ms))
    }

    pub fn mark_online(&mut self, addr: ShortAddr, now_ms: u64) -> Result<Lifecycle> {
        let offline_after_ms = self.offline_after_ms;
        let device = self
            .devices
            .get_mut(&addr)
            .ok_or(RegistryError::DeviceNotFound(addr))?;
        device.mark_online(now_ms);
        Ok(device.lifecycle(offline_after_ms, now_ms))
    }

    pub fn lifecycle(&self, addr: ShortAddr, now_ms: u64) -> Option<Lifecycle> {
        self.devices
            .get(&addr)
            .map(|d| d.lifecycle(self.offline_after_ms, now_ms))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn snapshot(&self, now_ms: u64) -> RegistrySnapshot {
        RegistrySnapshot {
            generated_at: Utc::now(),
            offline_after_ms: self.offline_after_ms,
            devices: self
                .devices
                .values()
                .map(|d| DeviceSnapshot {
                    device: d.clone(),
                    lifecycle: d.lifecycle(self.offline_after_ms, now_ms),
                })
                .collect(),
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(300_000)
    }
}
