//! Registry error types

use meshcoord_protocol::ShortAddr;
use thiserror::Error;

use crate::capability::Feature;

/// Registry-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(ShortAddr),

    #[error("Feature '{0}' not mapped on device")]
    FeatureNotMapped(Feature),

    #[error("Feature '{feature}' is ambiguous ({count} endpoints); pass an endpoint selector")]
    AmbiguousFeature { feature: Feature, count: usize },

    #[error("Feature '{feature}' selector {selector} out of range (1..={count})")]
    SelectorOutOfRange {
        feature: Feature,
        selector: u8,
        count: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
