//! Application callbacks and commissioning events
//!
//! Discovery and self-heal report every attempt through the same
//! [`CommissioningEvent::Attempt`] record.

use meshcoord_protocol::{ShortAddr, SignalKind};
use meshcoord_registry::DiscoveredDevice;
use serde::Serialize;
use std::fmt;

/// Fault that started a self-heal run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealReason {
    PanIdConflict,
    SteeringFailure,
}

/// Recovery step a self-heal run repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealAction {
    /// Form a fresh network
    Reform,
    /// Rejoin an existing network
    Rejoin,
}

impl fmt::Display for HealReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealReason::PanIdConflict => f.write_str("pan_id_conflict"),
            HealReason::SteeringFailure => f.write_str("steering_failure"),
        }
    }
}

impl fmt::Display for HealAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealAction::Reform => f.write_str("reform"),
            HealAction::Rejoin => f.write_str("rejoin"),
        }
    }
}

/// What an attempt was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptTarget {
    Discovery(ShortAddr),
    SelfHeal { reason: HealReason, action: HealAction },
}

/// Outcome of a single bounded-retry attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptOutcome {
    pub target: AttemptTarget,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    pub success: bool,
    pub error: Option<String>,
    /// When the next attempt is due, if one was scheduled
    pub next_try_ms: Option<u64>,
    /// No further attempts will be made
    pub exhausted: bool,
    pub at_ms: u64,
}

/// Commissioning event delivered to the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommissioningEvent {
    Attempt(AttemptOutcome),
    PanIdConflict { status: i32, at_ms: u64 },
    DeviceLeft { short_addr: ShortAddr, removed: bool, at_ms: u64 },
    Signal { kind: SignalKind, status: i32, at_ms: u64 },
}

pub type DeviceCallback = Box<dyn FnMut(&DiscoveredDevice) + Send>;
pub type EventCallback = Box<dyn FnMut(&CommissioningEvent) + Send>;

/// Registered application callbacks
#[derive(Default)]
pub struct Hooks {
    on_device_added: Option<DeviceCallback>,
    on_device_updated: Option<DeviceCallback>,
    on_commissioning_event: Option<EventCallback>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_device_added(&mut self, callback: Option<DeviceCallback>) {
        self.on_device_added = callback;
    }

    pub fn set_on_device_updated(&mut self, callback: Option<DeviceCallback>) {
        self.on_device_updated = callback;
    }

    pub fn set_on_commissioning_event(&mut self, callback: Option<EventCallback>) {
        self.on_commissioning_event = callback;
    }

    pub fn device_added(&mut self, device: &DiscoveredDevice) {
        if let Some(cb) = self.on_device_added.as_mut() {
            cb(device);
        }
    }

    pub fn device_updated(&mut self, device: &DiscoveredDevice) {
        if let Some(cb) = self.on_device_updated.as_mut() {
            cb(device);
        }
    }

    pub fn emit(&mut self, event: CommissioningEvent) {
        if let Some(cb) = self.on_commissioning_event.as_mut() {
            cb(&event);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_device_added", &self.on_device_added.is_some())
            .field("on_device_updated", &self.on_device_updated.is_some())
            .field("on_commissioning_event", &self.on_commissioning_event.is_some())
            .finish()
    }
}
