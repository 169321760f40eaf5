//! Capability resolution
//!
//! Maps the server clusters a device exposes to semantic feature tags and
//! builds the endpoint lookup tables used to address those features.
//! Resolution never fails: unknown clusters are ignored.

use meshcoord_protocol::{cluster, ClusterId, EndpointDescriptor, EndpointId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Semantic device feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    OnOff,
    Level,
    Color,
    Temperature,
    Humidity,
    Pressure,
    Occupancy,
    Lock,
    Cover,
    IasZone,
    Thermostat,
    Energy,
}

/// Cluster to feature table
const FEATURE_BY_CLUSTER: &[(ClusterId, Feature)] = &[
    (cluster::ON_OFF, Feature::OnOff),
    (cluster::LEVEL_CONTROL, Feature::Level),
    (cluster::COLOR_CONTROL, Feature::Color),
    (cluster::TEMPERATURE_MEASUREMENT, Feature::Temperature),
    (cluster::REL_HUMIDITY_MEASUREMENT, Feature::Humidity),
    (cluster::PRESSURE_MEASUREMENT, Feature::Pressure),
    (cluster::OCCUPANCY_SENSING, Feature::Occupancy),
    (cluster::DOOR_LOCK, Feature::Lock),
    (cluster::WINDOW_COVERING, Feature::Cover),
    (cluster::IAS_ZONE, Feature::IasZone),
    (cluster::THERMOSTAT, Feature::Thermostat),
    (cluster::ELECTRICAL_MEASUREMENT, Feature::Energy),
];

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::OnOff,
        Feature::Level,
        Feature::Color,
        Feature::Temperature,
        Feature::Humidity,
        Feature::Pressure,
        Feature::Occupancy,
        Feature::Lock,
        Feature::Cover,
        Feature::IasZone,
        Feature::Thermostat,
        Feature::Energy,
    ];

    /// String tag, e.g. `"on_off"`
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::OnOff => "on_off",
            Feature::Level => "level",
            Feature::Color => "color",
            Feature::Temperature => "temperature",
            Feature::Humidity => "humidity",
            Feature::Pressure => "pressure",
            Feature::Occupancy => "occupancy",
            Feature::Lock => "lock",
            Feature::Cover => "cover",
            Feature::IasZone => "ias_zone",
            Feature::Thermostat => "thermostat",
            Feature::Energy => "energy",
        }
    }

    /// Cluster that provides this feature
    pub fn cluster(&self) -> ClusterId {
        FEATURE_BY_CLUSTER
            .iter()
            .find(|(_, feature)| feature == self)
            .map(|(cluster, _)| *cluster)
            .unwrap_or(cluster::BASIC)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Feature::ALL
            .iter()
            .find(|feature| feature.as_str().eq_ignore_ascii_case(tag))
            .copied()
            .ok_or_else(|| RegistryError::UnknownFeature(s.to_string()))
    }
}

/// Feature provided by a cluster, if any
pub fn feature_for_cluster(cluster_id: ClusterId) -> Option<Feature> {
    FEATURE_BY_CLUSTER
        .iter()
        .find(|(cluster, _)| *cluster == cluster_id)
        .map(|(_, feature)| *feature)
}

/// Features and endpoint lookup tables derived from a set of endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedCapabilities {
    features: BTreeSet<Feature>,

    /// Server cluster -> endpoints exposing it, ascending
    cluster_endpoints: BTreeMap<ClusterId, Vec<EndpointId>>,

    /// Feature -> endpoints providing it, ascending
    feature_endpoints: BTreeMap<Feature, Vec<EndpointId>>,
}

impl ResolvedCapabilities {
    pub fn features(&self) -> &BTreeSet<Feature> {
        &self.features
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Lowest endpoint exposing `cluster_id` as a server cluster
    pub fn endpoint_for(&self, cluster_id: ClusterId) -> Option<EndpointId> {
        self.cluster_endpoints
            .get(&cluster_id)
            .and_then(|eps| eps.first().copied())
    }

    pub fn endpoints_for(&self, cluster_id: ClusterId) -> &[EndpointId] {
        self.cluster_endpoints
            .get(&cluster_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn feature_endpoints(&self, feature: Feature) -> &[EndpointId] {
        self.feature_endpoints
            .get(&feature)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn insert_sorted(list: &mut Vec<EndpointId>, endpoint: EndpointId) {
    if let Err(pos) = list.binary_search(&endpoint) {
        list.insert(pos, endpoint);
    }
}

/// Resolve features from endpoint descriptors
///
/// Only server (input) clusters contribute. Endpoint order in the input
/// does not matter.
pub fn resolve<'a>(
    endpoints: impl IntoIterator<Item = &'a EndpointDescriptor>,
) -> ResolvedCapabilities {
    let mut resolved = ResolvedCapabilities::default();

    for ep in endpoints {
        for &cluster_id in &ep.input_clusters {
            insert_sorted(
                resolved.cluster_endpoints.entry(cluster_id).or_default(),
                ep.endpoint,
            );

            if let Some(feature) = feature_for_cluster(cluster_id) {
                resolved.features.insert(feature);
                insert_sorted(
                    resolved.feature_endpoints.entry(feature).or_default(),
                    ep.endpoint,
                );
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcoord_protocol::cluster::PROFILE_HOME_AUTOMATION;

    fn ep(id: EndpointId, inputs: &[ClusterId]) -> EndpointDescriptor {
        EndpointDescriptor::new(id, PROFILE_HOME_AUTOMATION, 0x0100)
            .with_inputs(inputs.iter().copied())
    }

    #[test]
    fn test_capability_derivation() {
        let endpoints = vec![
            ep(1, &[cluster::ON_OFF, cluster::LEVEL_CONTROL]),
            ep(2, &[cluster::TEMPERATURE_MEASUREMENT]),
        ];
        let caps = resolve(&endpoints);

        assert!(caps.has_feature(Feature::OnOff));
        assert!(caps.has_feature(Feature::Level));
        assert!(caps.has_feature(Feature::Temperature));
        assert_eq!(caps.endpoint_for(cluster::ON_OFF), Some(1));
        assert_eq!(caps.endpoint_for(cluster::TEMPERATURE_MEASUREMENT), Some(2));
        assert_eq!(caps.endpoint_for(cluster::DOOR_LOCK), None);
    }

    #[test]
    fn test_multi_endpoint_overlap() {
        // Reverse order on purpose; lookups stay ascending
        let endpoints = vec![ep(2, &[cluster::ON_OFF]), ep(1, &[cluster::ON_OFF])];
        let caps = resolve(&endpoints);

        assert_eq!(caps.feature_endpoints(Feature::OnOff), &[1, 2]);
        assert_eq!(caps.endpoints_for(cluster::ON_OFF), &[1, 2]);
        assert_eq!(caps.endpoint_for(cluster::ON_OFF), Some(1));
    }

    #[test]
    fn test_output_clusters_do_not_count() {
        let switch = EndpointDescriptor::new(1, PROFILE_HOME_AUTOMATION, 0x0000)
            .with_inputs([cluster::BASIC])
            .with_outputs([cluster::ON_OFF, cluster::LEVEL_CONTROL]);
        let caps = resolve([&switch]);

        assert!(caps.features().is_empty());
        assert_eq!(caps.endpoint_for(cluster::ON_OFF), None);
        assert_eq!(caps.endpoint_for(cluster::BASIC), Some(1));
    }

    #[test]
    fn test_unknown_clusters_ignored() {
        let caps = resolve([&ep(1, &[0xFC00, 0xFC01])]);
        assert!(caps.features().is_empty());
        assert_eq!(caps.endpoints_for(0xFC00), &[1]);
        assert!(resolve(std::iter::empty()).features().is_empty());
    }

    #[test]
    fn test_feature_tags() {
        assert_eq!(Feature::OnOff.as_str(), "on_off");
        assert_eq!("ias_zone".parse::<Feature>().unwrap(), Feature::IasZone);
        assert_eq!("ENERGY".parse::<Feature>().unwrap(), Feature::Energy);
        assert!("dimmer".parse::<Feature>().is_err());
        for feature in Feature::ALL {
            assert_eq!(feature_for_cluster(feature.cluster()), Some(feature));
        }
    }

    #[test]
    fn test_feature_serde_tag() {
        let json = serde_json::to_string(&Feature::IasZone).unwrap();
        assert_eq!(json, "\"ias_zone\"");
    }
}
