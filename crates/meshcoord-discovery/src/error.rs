//! Discovery error types

use meshcoord_protocol::ShortAddr;
use meshcoord_stack::StackError;
use thiserror::Error;

/// Discovery-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Discovery of {addr} timed out after {timeout_ms} ms")]
    Timeout { addr: ShortAddr, timeout_ms: u64 },

    #[error("Address {0} cannot be discovered")]
    InvalidAddress(ShortAddr),

    #[error("Stack error: {0}")]
    Stack(#[from] StackError),
}

impl DiscoveryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DiscoveryError::Timeout { .. })
    }

    /// The node answered but a descriptor request failed, so a round
    /// without the power descriptor may still succeed
    pub fn allows_power_fallback(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Stack(StackError::DiscoveryFailed { .. })
                | DiscoveryError::Stack(StackError::CommandFailed(_))
        )
    }
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
