//! Explicit, versioned capability query
//!
//! Callers check these flags before using an optional stack feature
//! instead of attempting the call and inspecting the error.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional features a stack may support
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct StackFeatures: u32 {
        /// Discovery can request the power descriptor
        const POWER_DESCRIPTOR = 1 << 0;
        /// Joining an existing network via BDB network steering
        const NETWORK_STEERING = 1 << 1;
        /// Stack remembers the short address of the last joined node
        const LAST_JOINED_HINT = 1 << 2;
        /// Channel mask, PAN id and extended PAN id can be set before start
        const NETWORK_IDENTITY = 1 << 3;
        /// Stack reports the short address of the last node that left
        const LEAVE_ADDRESS = 1 << 4;
    }
}

/// Capability report of a stack implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackCapabilities {
    /// Capability schema version
    pub version: u16,

    pub flags: StackFeatures,
}

impl StackCapabilities {
    pub const CURRENT_VERSION: u16 = 1;

    pub fn new(flags: StackFeatures) -> Self {
        StackCapabilities {
            version: Self::CURRENT_VERSION,
            flags,
        }
    }

    /// Every optional feature
    pub fn full() -> Self {
        Self::new(StackFeatures::all())
    }

    /// Only the mandatory operations
    pub fn minimal() -> Self {
        Self::new(StackFeatures::empty())
    }

    pub fn supports(&self, feature: StackFeatures) -> bool {
        self.flags.contains(feature)
    }
}

impl Default for StackCapabilities {
    fn default() -> Self {
        Self::full()
    }
}
