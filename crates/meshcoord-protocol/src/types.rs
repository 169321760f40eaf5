//! Core protocol types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// Endpoint identifier on a remote node (1-240 for applications)
pub type EndpointId = u8;

/// ZCL cluster identifier
pub type ClusterId = u16;

/// Size of an IEEE address in bytes
pub const IEEE_ADDR_SIZE: usize = 8;

/// 16-bit network address assigned to a node after it joins
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortAddr(u16);

impl ShortAddr {
    /// The coordinator itself
    pub const COORDINATOR: ShortAddr = ShortAddr(0x0000);
    /// Placeholder used by the stack before an address is assigned
    pub const UNASSIGNED: ShortAddr = ShortAddr(0xFFFE);
    /// All-devices broadcast
    pub const BROADCAST: ShortAddr = ShortAddr(0xFFFF);

    pub const fn new(raw: u16) -> Self {
        ShortAddr(raw)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// True when the address names a single remote node that can be discovered
    pub fn is_discoverable(&self) -> bool {
        !matches!(*self, Self::COORDINATOR | Self::UNASSIGNED | Self::BROADCAST)
    }
}

impl From<u16> for ShortAddr {
    fn from(raw: u16) -> Self {
        ShortAddr(raw)
    }
}

impl fmt::Debug for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortAddr({:#06x})", self.0)
    }
}

impl fmt::Display for ShortAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Globally unique 64-bit hardware identifier of a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IeeeAddr([u8; IEEE_ADDR_SIZE]);

impl IeeeAddr {
    pub const fn from_bytes(bytes: [u8; IEEE_ADDR_SIZE]) -> Self {
        IeeeAddr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IEEE_ADDR_SIZE] {
        &self.0
    }

    /// All-zero or all-ones: the stack did not report a real identity
    pub fn is_unknown(&self) -> bool {
        self.0.iter().all(|b| *b == 0) || self.0.iter().all(|b| *b == 0xFF)
    }

    /// Compact lowercase hex form, e.g. `00124b0001020304`
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex; `:`, `-` and spaces between octets are accepted
    pub fn from_hex(s: &str) -> Result<Self> {
        let compact: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();

        let bytes =
            hex::decode(&compact).map_err(|e| ProtocolError::InvalidIeeeAddr(e.to_string()))?;

        if bytes.len() != IEEE_ADDR_SIZE {
            return Err(ProtocolError::InvalidIeeeAddr(format!(
                "expected {} bytes, got {}",
                IEEE_ADDR_SIZE,
                bytes.len()
            )));
        }

        let mut arr = [0u8; IEEE_ADDR_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(IeeeAddr(arr))
    }
}

impl FromStr for IeeeAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for IeeeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IeeeAddr({})", self.to_hex())
    }
}

impl fmt::Display for IeeeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for IeeeAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IeeeAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IeeeAddr::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 802.15.4 channel bitmask (bit N set = channel N usable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelMask(u32);

impl ChannelMask {
    pub const MIN_CHANNEL: u8 = 11;
    pub const MAX_CHANNEL: u8 = 26;

    /// Every 2.4 GHz channel (11-26)
    pub const ALL: ChannelMask = ChannelMask(0x07FF_F800);

    pub fn from_channel(channel: u8) -> Result<Self> {
        if !(Self::MIN_CHANNEL..=Self::MAX_CHANNEL).contains(&channel) {
            return Err(ProtocolError::InvalidChannel(channel));
        }
        Ok(ChannelMask(1 << channel))
    }

    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits == 0 || bits & !Self::ALL.0 != 0 {
            return Err(ProtocolError::InvalidChannelMask(bits));
        }
        Ok(ChannelMask(bits))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// The channel when exactly one bit is set
    pub fn single_channel(&self) -> Option<u8> {
        if self.0.count_ones() != 1 {
            return None;
        }
        Some(self.0.trailing_zeros() as u8)
    }

    pub fn channels(&self) -> Vec<u8> {
        (Self::MIN_CHANNEL..=Self::MAX_CHANNEL)
            .filter(|ch| self.0 & (1 << ch) != 0)
            .collect()
    }
}

/// Personal area network identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct PanId(u16);

impl PanId {
    pub fn new(raw: u16) -> Result<Self> {
        if raw == 0x0000 || raw == 0xFFFF {
            return Err(ProtocolError::InvalidPanId(raw));
        }
        Ok(PanId(raw))
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for PanId {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self> {
        PanId::new(raw)
    }
}

impl From<PanId> for u16 {
    fn from(pan_id: PanId) -> u16 {
        pan_id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_addr_discoverable() {
        assert!(!ShortAddr::COORDINATOR.is_discoverable());
        assert!(!ShortAddr::UNASSIGNED.is_discoverable());
        assert!(!ShortAddr::BROADCAST.is_discoverable());
        assert!(ShortAddr::new(0x1234).is_discoverable());
    }

    #[test]
    fn test_short_addr_display() {
        assert_eq!(ShortAddr::new(0x2a).to_string(), "0x002a");
    }

    #[test]
    fn test_ieee_hex_with_separators() {
        let addr = IeeeAddr::from_hex("00:12:4b:00:01:02:03:04").unwrap();
        assert_eq!(addr.as_bytes(), &[0x00, 0x12, 0x4b, 0x00, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(addr.to_hex(), "00124b0001020304");

        let parsed: IeeeAddr = "00124B0001020304".parse().unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn test_ieee_unknown() {
        assert!(IeeeAddr::default().is_unknown());
        assert!(IeeeAddr::from_bytes([0xFF; IEEE_ADDR_SIZE]).is_unknown());
        assert!(!IeeeAddr::from_bytes([0, 0x12, 0x4b, 0, 0, 0, 0, 1]).is_unknown());
    }

    #[test]
    fn test_ieee_rejects_wrong_length() {
        assert!(IeeeAddr::from_hex("0011").is_err());
        assert!(IeeeAddr::from_hex("zz124b0001020304").is_err());
    }

    #[test]
    fn test_ieee_serde_as_hex_string() {
        let addr = IeeeAddr::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0102030405060708\"");
        let back: IeeeAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_channel_mask() {
        let mask = ChannelMask::from_channel(15).unwrap();
        assert_eq!(mask.bits(), 1 << 15);
        assert_eq!(mask.single_channel(), Some(15));
        assert!(ChannelMask::from_channel(10).is_err());
        assert!(ChannelMask::from_channel(27).is_err());
        assert_eq!(ChannelMask::ALL.single_channel(), None);
        assert_eq!(ChannelMask::ALL.channels().len(), 16);
        assert!(ChannelMask::from_bits(1 << 3).is_err());
    }

    #[test]
    fn test_pan_id_range() {
        assert!(PanId::new(0x1A62).is_ok());
        assert!(PanId::new(0x0000).is_err());
        assert!(PanId::new(0xFFFF).is_err());
    }
}
