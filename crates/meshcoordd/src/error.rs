//! Coordinator error types

use meshcoord_discovery::DiscoveryError;
use meshcoord_protocol::ShortAddr;
use meshcoord_registry::RegistryError;
use meshcoord_stack::StackError;
use thiserror::Error;

/// Errors surfaced by the coordinator facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Coordinator not started")]
    NotStarted,

    #[error("Device not found: {0}")]
    DeviceNotFound(ShortAddr),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Stack error: {0}")]
    Stack(#[from] StackError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
