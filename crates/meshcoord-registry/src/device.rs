//! Discovered device record

use meshcoord_protocol::{
    cluster, ClusterId, EndpointDescriptor, EndpointId, IeeeAddr, NodeDescriptors,
    PowerDescriptor, ShortAddr,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::capability::{resolve, Feature, ResolvedCapabilities};
use crate::error::{RegistryError, Result};
use crate::lifecycle::{self, Lifecycle};

/// Administrative offline state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineMark {
    pub reason: Option<String>,
    pub since_ms: u64,
}

/// Picks one endpoint when a feature is exposed on several
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSelector {
    /// Only valid when exactly one endpoint provides the feature
    Unique,
    /// Literal endpoint id if it provides the feature, otherwise a
    /// 1-based index into the ascending endpoint list
    Pick(u8),
}

impl Default for EndpointSelector {
    fn default() -> Self {
        EndpointSelector::Pick(1)
    }
}

/// A device as learned from its last successful discovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    pub short_addr: ShortAddr,
    pub ieee_addr: IeeeAddr,
    pub manufacturer_code: Option<u16>,
    pub power: Option<PowerDescriptor>,

    /// Simple descriptors keyed by endpoint id
    endpoints: BTreeMap<EndpointId, EndpointDescriptor>,

    capabilities: ResolvedCapabilities,

    /// Errors reported for a partial discovery
    pub discovery_errors: Vec<String>,

    pub first_seen_ms: u64,
    pub last_seen_ms: u64,

    offline: Option<OfflineMark>,
}

impl DiscoveredDevice {
    /// Build a device from discovery output
    ///
    /// The green-power proxy endpoint is skipped; features are derived here
    /// and cannot be set any other way.
    pub fn from_descriptors(desc: NodeDescriptors, now_ms: u64) -> Self {
        let endpoints: BTreeMap<EndpointId, EndpointDescriptor> = desc
            .endpoints
            .into_iter()
            .filter(|ep| ep.endpoint != cluster::GREEN_POWER_ENDPOINT)
            .map(|ep| (ep.endpoint, ep))
            .collect();
        let capabilities = resolve(endpoints.values());

        DiscoveredDevice {
            short_addr: desc.short_addr,
            ieee_addr: desc.ieee_addr,
            manufacturer_code: desc.node.map(|n| n.manufacturer_code),
            power: desc.power,
            endpoints,
            capabilities,
            discovery_errors: desc.errors,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            offline: None,
        }
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.endpoints.values()
    }

    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.endpoints.keys().copied().collect()
    }

    pub fn endpoint(&self, endpoint: EndpointId) -> Option<&EndpointDescriptor> {
        self.endpoints.get(&endpoint)
    }

    /// Lowest endpoint; its profile and device id identify the device
    pub fn primary_endpoint(&self) -> Option<&EndpointDescriptor> {
        self.endpoints.values().next()
    }

    pub fn profile_id(&self) -> Option<u16> {
        self.primary_endpoint().map(|ep| ep.profile_id)
    }

    pub fn device_id(&self) -> Option<u16> {
        self.primary_endpoint().map(|ep| ep.device_id)
    }

    pub fn capabilities(&self) -> &ResolvedCapabilities {
        &self.capabilities
    }

    pub fn features(&self) -> &BTreeSet<Feature> {
        self.capabilities.features()
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.capabilities.has_feature(feature)
    }

    pub fn endpoint_for(&self, cluster_id: ClusterId) -> Option<EndpointId> {
        self.capabilities.endpoint_for(cluster_id)
    }

    pub fn endpoints_for(&self, cluster_id: ClusterId) -> &[EndpointId] {
        self.capabilities.endpoints_for(cluster_id)
    }

    pub fn feature_endpoints(&self, feature: Feature) -> &[EndpointId] {
        self.capabilities.feature_endpoints(feature)
    }

    /// Resolve one endpoint for `feature`
    pub fn select_feature_endpoint(
        &self,
        feature: Feature,
        selector: EndpointSelector,
    ) -> Result<EndpointId> {
        let endpoints = self.feature_endpoints(feature);
        if endpoints.is_empty() {
            return Err(RegistryError::FeatureNotMapped(feature));
        }

        match selector {
            EndpointSelector::Unique => {
                if endpoints.len() != 1 {
                    return Err(RegistryError::AmbiguousFeature {
                        feature,
                        count: endpoints.len(),
                    });
                }
                Ok(endpoints[0])
            }
            EndpointSelector::Pick(selector) => {
                if endpoints.contains(&selector) {
                    return Ok(selector);
                }
                let index = selector as usize;
                if index < 1 || index > endpoints.len() {
                    return Err(RegistryError::SelectorOutOfRange {
                        feature,
                        selector,
                        count: endpoints.len(),
                    });
                }
                Ok(endpoints[index - 1])
            }
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.discovery_errors.is_empty()
    }

    /// Record that the device was heard from
    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = self.last_seen_ms.max(now_ms);
    }

    pub fn mark_offline(&mut self, reason: Option<String>, now_ms: u64) {
        self.offline = Some(OfflineMark {
            reason,
            since_ms: now_ms,
        });
    }

    /// Clear an administrative offline mark and refresh last-seen
    pub fn mark_online(&mut self, now_ms: u64) {
        self.offline = None;
        self.touch(now_ms);
    }

    pub fn offline_mark(&self) -> Option<&OfflineMark> {
        self.offline.as_ref()
    }

    pub fn lifecycle(&self, offline_after_ms: u64, now_ms: u64) -> Lifecycle {
        lifecycle::lifecycle(self, offline_after_ms, now_ms)
    }

    pub fn is_online(&self, offline_after_ms: u64, now_ms: u64) -> bool {
        self.lifecycle(offline_after_ms, now_ms).online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcoord_protocol::cluster::PROFILE_HOME_AUTOMATION;
    use meshcoord_protocol::NodeDescriptor;

    fn plug_with_two_sockets() -> NodeDescriptors {
        let mut desc = NodeDescriptors::new(
            ShortAddr::new(0x2001),
            IeeeAddr::from_bytes([0xa4, 0xc1, 0x38, 0, 0, 0, 0x20, 0x01]),
        )
        .with_endpoint(
            EndpointDescriptor::new(2, PROFILE_HOME_AUTOMATION, 0x010A)
                .with_inputs([cluster::ON_OFF]),
        )
        .with_endpoint(
            EndpointDescriptor::new(1, PROFILE_HOME_AUTOMATION, 0x0051)
                .with_inputs([cluster::ON_OFF, cluster::ELECTRICAL_MEASUREMENT]),
        )
        .with_endpoint(
            EndpointDescriptor::new(cluster::GREEN_POWER_ENDPOINT, 0xA1E0, 0x0061)
                .with_inputs([0x0021]),
        );
        desc.node = Some(NodeDescriptor {
            manufacturer_code: 0x1141,
            ..Default::default()
        });
        desc
    }

    #[test]
    fn test_from_descriptors() {
        let device = DiscoveredDevice::from_descriptors(plug_with_two_sockets(), 1_000);

        assert_eq!(device.endpoint_ids(), vec![1, 2]);
        assert_eq!(device.manufacturer_code, Some(0x1141));
        assert_eq!(device.profile_id(), Some(PROFILE_HOME_AUTOMATION));
        assert_eq!(device.device_id(), Some(0x0051));
        assert!(device.has_feature(Feature::OnOff));
        assert!(device.has_feature(Feature::Energy));
        assert_eq!(device.endpoint_for(cluster::ON_OFF), Some(1));
        assert_eq!(device.feature_endpoints(Feature::OnOff), &[1, 2]);
        assert_eq!(device.last_seen_ms, 1_000);
        assert!(!device.is_partial());
    }

    #[test]
    fn test_select_feature_endpoint() {
        let device = DiscoveredDevice::from_descriptors(plug_with_two_sockets(), 0);

        assert_eq!(
            device.select_feature_endpoint(Feature::OnOff, EndpointSelector::default()),
            Ok(1)
        );
        assert_eq!(
            device.select_feature_endpoint(Feature::OnOff, EndpointSelector::Pick(2)),
            Ok(2)
        );
        assert_eq!(
            device.select_feature_endpoint(Feature::OnOff, EndpointSelector::Unique),
            Err(RegistryError::AmbiguousFeature {
                feature: Feature::OnOff,
                count: 2
            })
        );
        assert_eq!(
            device.select_feature_endpoint(Feature::Energy, EndpointSelector::Unique),
            Ok(1)
        );
        assert!(matches!(
            device.select_feature_endpoint(Feature::OnOff, EndpointSelector::Pick(7)),
            Err(RegistryError::SelectorOutOfRange { .. })
        ));
        assert_eq!(
            device.select_feature_endpoint(Feature::Lock, EndpointSelector::default()),
            Err(RegistryError::FeatureNotMapped(Feature::Lock))
        );
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut device = DiscoveredDevice::from_descriptors(plug_with_two_sockets(), 5_000);
        device.touch(4_000);
        assert_eq!(device.last_seen_ms, 5_000);
        device.touch(6_000);
        assert_eq!(device.last_seen_ms, 6_000);
    }

    #[test]
    fn test_offline_mark_round_trip() {
        let mut device = DiscoveredDevice::from_descriptors(plug_with_two_sockets(), 0);
        device.mark_offline(Some("maintenance".to_string()), 10);
        assert_eq!(device.offline_mark().map(|m| m.since_ms), Some(10));

        device.mark_online(20);
        assert!(device.offline_mark().is_none());
        assert_eq!(device.last_seen_ms, 20);
    }
}
