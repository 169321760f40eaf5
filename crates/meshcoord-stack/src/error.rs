//! Radio stack error types

use meshcoord_protocol::ShortAddr;
use thiserror::Error;

/// Errors reported by a radio stack implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("Stack not started")]
    NotStarted,

    #[error("No response from {0}")]
    NoResponse(ShortAddr),

    #[error("Discovery of {addr} failed: {reason}")]
    DiscoveryFailed { addr: ShortAddr, reason: String },

    #[error("Operation not supported by this stack: {0}")]
    Unsupported(&'static str),

    #[error("Network start failed: {0}")]
    StartFailed(String),

    #[error("Stack command failed: {0}")]
    CommandFailed(String),

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] meshcoord_protocol::ProtocolError),
}

/// Result type for stack operations
pub type Result<T> = std::result::Result<T, StackError>;
