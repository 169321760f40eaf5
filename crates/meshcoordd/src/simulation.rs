//! Simulated devices for running the daemon without a radio

use meshcoord_protocol::{
    cluster, EndpointDescriptor, IeeeAddr, NodeDescriptor, NodeDescriptors, PowerDescriptor,
    ShortAddr,
};
use meshcoord_stack::SimulatedStack;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// First short address handed to simulated devices
const FIRST_SIM_ADDR: u16 = 0x1000;

/// Device kinds the simulation cycles through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDeviceKind {
    DimmableLight,
    TemperatureSensor,
    DoorLock,
    SmartPlug,
}

impl SimDeviceKind {
    const CYCLE: [SimDeviceKind; 4] = [
        SimDeviceKind::DimmableLight,
        SimDeviceKind::TemperatureSensor,
        SimDeviceKind::DoorLock,
        SimDeviceKind::SmartPlug,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }

    fn endpoints(&self) -> Vec<EndpointDescriptor> {
        let ha = cluster::PROFILE_HOME_AUTOMATION;
        match self {
            SimDeviceKind::DimmableLight => vec![EndpointDescriptor::new(1, ha, 0x0101)
                .with_inputs([
                    cluster::BASIC,
                    cluster::GROUPS,
                    cluster::SCENES,
                    cluster::ON_OFF,
                    cluster::LEVEL_CONTROL,
                ])
                .with_outputs([cluster::OTA_UPGRADE])],
            SimDeviceKind::TemperatureSensor => vec![EndpointDescriptor::new(1, ha, 0x0302)
                .with_inputs([
                    cluster::BASIC,
                    cluster::TEMPERATURE_MEASUREMENT,
                    cluster::REL_HUMIDITY_MEASUREMENT,
                ])],
            SimDeviceKind::DoorLock => vec![EndpointDescriptor::new(1, ha, 0x000A)
                .with_inputs([cluster::BASIC, cluster::DOOR_LOCK])],
            // Two switchable outlets plus metering
            SimDeviceKind::SmartPlug => vec![
                EndpointDescriptor::new(1, ha, 0x0051).with_inputs([
                    cluster::BASIC,
                    cluster::ON_OFF,
                    cluster::ELECTRICAL_MEASUREMENT,
                ]),
                EndpointDescriptor::new(2, ha, 0x0051).with_inputs([cluster::ON_OFF]),
            ],
        }
    }

    fn is_sleepy(&self) -> bool {
        matches!(self, SimDeviceKind::TemperatureSensor | SimDeviceKind::DoorLock)
    }
}

/// Descriptors for the `index`-th simulated device
pub fn sim_node(index: usize) -> NodeDescriptors {
    let kind = SimDeviceKind::for_index(index);
    let offset = u16::try_from(index).unwrap_or(u16::MAX - FIRST_SIM_ADDR);
    let short = ShortAddr::new(FIRST_SIM_ADDR.saturating_add(offset));
    let ieee = IeeeAddr::from_bytes([
        0x00,
        0x12,
        0x4b,
        0x00,
        0x5e,
        0x00,
        (index >> 8) as u8,
        index as u8,
    ]);

    let mut descriptors = NodeDescriptors::new(short, ieee);
    descriptors.node = Some(NodeDescriptor {
        logical_type: if kind.is_sleepy() { 2 } else { 1 },
        manufacturer_code: 0x1234,
        mac_capability_flags: if kind.is_sleepy() { 0x80 } else { 0x8e },
    });
    descriptors.power = Some(PowerDescriptor {
        current_power_mode: 0,
        available_power_sources: if kind.is_sleepy() { 0x04 } else { 0x01 },
        current_power_source: if kind.is_sleepy() { 0x04 } else { 0x01 },
        current_power_source_level: 0x0C,
    });
    for endpoint in kind.endpoints() {
        descriptors = descriptors.with_endpoint(endpoint);
    }
    descriptors
}

/// Join `count` simulated devices, one every `interval`
pub fn spawn_joiner(
    stack: Arc<SimulatedStack>,
    count: usize,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for index in 0..count {
            tokio::time::sleep(interval).await;
            let node = sim_node(index);
            info!(
                "Simulating join of {:?} at {}",
                SimDeviceKind::for_index(index),
                node.short_addr
            );
            stack.join_node(node);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcoord_registry::{resolve, Feature};

    #[test]
    fn test_sim_nodes_are_distinct() {
        let a = sim_node(0);
        let b = sim_node(5);
        assert_ne!(a.short_addr, b.short_addr);
        assert_ne!(a.ieee_addr, b.ieee_addr);
        assert!(a.short_addr.is_discoverable());
    }

    #[test]
    fn test_sim_catalog_features() {
        let plug = resolve(&sim_node(3).endpoints);
        assert_eq!(plug.feature_endpoints(Feature::OnOff), &[1, 2]);
        assert!(plug.has_feature(Feature::Energy));

        let light = resolve(&sim_node(0).endpoints);
        assert!(light.has_feature(Feature::Level));
        assert!(!light.has_feature(Feature::Temperature));
    }

    #[tokio::test(start_paused = true)]
    async fn test_joiner_adds_nodes() {
        let stack = Arc::new(SimulatedStack::default());
        let handle = spawn_joiner(stack.clone(), 3, Duration::from_millis(100));
        handle.await.unwrap();
        assert_eq!(stack.node_count(), 3);
    }
}
