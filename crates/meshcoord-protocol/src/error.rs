//! Error types for protocol operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid IEEE address: {0}")]
    InvalidIeeeAddr(String),

    #[error("Invalid channel: {0} (expected 11..=26)")]
    InvalidChannel(u8),

    #[error("Invalid channel mask: {0:#010x}")]
    InvalidChannelMask(u32),

    #[error("Invalid PAN ID: {0:#06x} (expected 0x0001..=0xFFFE)")]
    InvalidPanId(u16),
}
