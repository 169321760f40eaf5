//! ZDO descriptor data returned by a discovery round

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{ClusterId, EndpointId, IeeeAddr, ShortAddr};

/// Simple descriptor of one application endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub endpoint: EndpointId,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    /// Server clusters
    pub input_clusters: BTreeSet<ClusterId>,
    /// Client clusters
    pub output_clusters: BTreeSet<ClusterId>,
}

impl EndpointDescriptor {
    pub fn new(endpoint: EndpointId, profile_id: u16, device_id: u16) -> Self {
        EndpointDescriptor {
            endpoint,
            profile_id,
            device_id,
            device_version: 0,
            input_clusters: BTreeSet::new(),
            output_clusters: BTreeSet::new(),
        }
    }

    pub fn with_inputs(mut self, clusters: impl IntoIterator<Item = ClusterId>) -> Self {
        self.input_clusters.extend(clusters);
        self
    }

    pub fn with_outputs(mut self, clusters: impl IntoIterator<Item = ClusterId>) -> Self {
        self.output_clusters.extend(clusters);
        self
    }

    pub fn has_input(&self, cluster: ClusterId) -> bool {
        self.input_clusters.contains(&cluster)
    }
}

/// Power descriptor of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerDescriptor {
    pub current_power_mode: u8,
    pub available_power_sources: u8,
    pub current_power_source: u8,
    pub current_power_source_level: u8,
}

/// Node descriptor fields the coordinator keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub logical_type: u8,
    pub manufacturer_code: u16,
    pub mac_capability_flags: u8,
}

/// Everything one discovery round learned about a node
///
/// A partial result carries the descriptors that did arrive and the
/// per-request error text in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptors {
    pub short_addr: ShortAddr,
    pub ieee_addr: IeeeAddr,
    pub node: Option<NodeDescriptor>,
    pub endpoints: Vec<EndpointDescriptor>,
    pub power: Option<PowerDescriptor>,
    pub errors: Vec<String>,
}

impl NodeDescriptors {
    pub fn new(short_addr: ShortAddr, ieee_addr: IeeeAddr) -> Self {
        NodeDescriptors {
            short_addr,
            ieee_addr,
            node: None,
            endpoints: Vec::new(),
            power: None,
            errors: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn manufacturer_code(&self) -> Option<u16> {
        self.node.map(|n| n.manufacturer_code)
    }

    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster;

    #[test]
    fn test_endpoint_builder() {
        let ep = EndpointDescriptor::new(1, cluster::PROFILE_HOME_AUTOMATION, 0x0100)
            .with_inputs([cluster::ON_OFF, cluster::LEVEL_CONTROL, cluster::ON_OFF])
            .with_outputs([cluster::OTA_UPGRADE]);

        assert_eq!(ep.input_clusters.len(), 2);
        assert!(ep.has_input(cluster::ON_OFF));
        assert!(!ep.has_input(cluster::OTA_UPGRADE));
    }

    #[test]
    fn test_partial_descriptors() {
        let mut desc = NodeDescriptors::new(ShortAddr::new(0x1234), IeeeAddr::default());
        assert!(!desc.is_partial());
        assert_eq!(desc.manufacturer_code(), None);

        desc.node = Some(NodeDescriptor {
            manufacturer_code: 0x115F,
            ..Default::default()
        });
        desc.errors.push("power descriptor timeout".to_string());
        assert!(desc.is_partial());
        assert_eq!(desc.manufacturer_code(), Some(0x115F));
    }
}
