//! Online/offline status derived from last-seen timestamps

use serde::Serialize;

use crate::device::DiscoveredDevice;

/// Liveness view of a device at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lifecycle {
    pub online: bool,
    pub last_seen_ms: u64,
    pub last_seen_age_ms: u64,
    pub forced_offline: bool,
    pub offline_reason: Option<String>,
    pub offline_since_ms: Option<u64>,
}

/// Derive the lifecycle of `device` at `now_ms`
///
/// A device is online when it has no administrative offline mark and was
/// heard from less than `offline_after_ms` ago. Zero disables staleness.
pub fn lifecycle(device: &DiscoveredDevice, offline_after_ms: u64, now_ms: u64) -> Lifecycle {
    let age = now_ms.saturating_sub(device.last_seen_ms);
    let mark = device.offline_mark();
    let fresh = offline_after_ms == 0 || age < offline_after_ms;

    Lifecycle {
        online: mark.is_none() && fresh,
        last_seen_ms: device.last_seen_ms,
        last_seen_age_ms: age,
        forced_offline: mark.is_some(),
        offline_reason: mark.and_then(|m| m.reason.clone()),
        offline_since_ms: mark.map(|m| m.since_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcoord_protocol::{IeeeAddr, NodeDescriptors, ShortAddr};

    fn device(last_seen_ms: u64) -> DiscoveredDevice {
        DiscoveredDevice::from_descriptors(
            NodeDescriptors::new(ShortAddr::new(0x0101), IeeeAddr::default()),
            last_seen_ms,
        )
    }

    #[test]
    fn test_online_until_threshold() {
        let dev = device(1_000);
        assert!(lifecycle(&dev, 500, 1_499).online);
        assert!(!lifecycle(&dev, 500, 1_500).online);

        let lc = lifecycle(&dev, 500, 1_700);
        assert_eq!(lc.last_seen_age_ms, 700);
        assert!(!lc.forced_offline);
    }

    #[test]
    fn test_zero_threshold_disables_staleness() {
        let dev = device(0);
        assert!(lifecycle(&dev, 0, u64::MAX).online);
    }

    #[test]
    fn test_clock_behind_last_seen() {
        let lc = lifecycle(&device(2_000), 500, 1_000);
        assert!(lc.online);
        assert_eq!(lc.last_seen_age_ms, 0);
    }

    #[test]
    fn test_forced_offline() {
        let mut dev = device(1_000);
        dev.mark_offline(Some("battery swap".to_string()), 1_100);

        let lc = lifecycle(&dev, 0, 1_100);
        assert!(!lc.online);
        assert!(lc.forced_offline);
        assert_eq!(lc.offline_reason.as_deref(), Some("battery swap"));
        assert_eq!(lc.offline_since_ms, Some(1_100));
    }
}
