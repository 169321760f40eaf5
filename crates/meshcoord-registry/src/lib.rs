//! meshcoord Device Registry
//!
//! Keyed store of discovered devices. Each device carries the endpoint and
//! cluster layout from its last successful discovery and the semantic
//! features derived from it, so applications can ask for "something with
//! on/off" instead of a raw network address.

pub mod capability;
pub mod device;
pub mod error;
pub mod lifecycle;
pub mod registry;

pub use capability::{feature_for_cluster, resolve, Feature, ResolvedCapabilities};
pub use device::{DiscoveredDevice, EndpointSelector, OfflineMark};
pub use error::{RegistryError, Result};
pub use lifecycle::{lifecycle, Lifecycle};
pub use registry::{DeviceQuery, DeviceRegistry, RegistrySnapshot, UpsertOutcome};
