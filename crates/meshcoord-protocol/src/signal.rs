//! Stack signal identifiers
//!
//! The radio stack reports application signals as a raw `(id, status)`
//! pair. [`SignalKind`] closes the set of ids the coordinator understands
//! and keeps everything else as [`SignalKind::Unrecognized`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ShortAddr;

/// Known stack signal kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    DefaultStart,
    SkipStartup,
    DeviceAnnounce,
    Leave,
    Error,
    DeviceFirstStart,
    DeviceReboot,
    Steering,
    Formation,
    DeviceAssociated,
    LeaveIndication,
    CanSleep,
    NoActiveLinksLeft,
    DeviceAuthorized,
    DeviceUpdate,
    PanIdConflict,
    NwkStatusIndication,
    TcRejoinDone,
    PermitJoinStatus,
    SteeringCancelled,
    FormationCancelled,
    /// Any id outside the table above
    Unrecognized(u8),
}

/// Raw id table, kept in one place so encode and decode cannot drift
const SIGNAL_IDS: &[(u8, SignalKind)] = &[
    (0x00, SignalKind::DefaultStart),
    (0x01, SignalKind::SkipStartup),
    (0x02, SignalKind::DeviceAnnounce),
    (0x03, SignalKind::Leave),
    (0x04, SignalKind::Error),
    (0x05, SignalKind::DeviceFirstStart),
    (0x06, SignalKind::DeviceReboot),
    (0x0A, SignalKind::Steering),
    (0x0B, SignalKind::Formation),
    (0x12, SignalKind::DeviceAssociated),
    (0x13, SignalKind::LeaveIndication),
    (0x16, SignalKind::CanSleep),
    (0x18, SignalKind::NoActiveLinksLeft),
    (0x2F, SignalKind::DeviceAuthorized),
    (0x30, SignalKind::DeviceUpdate),
    (0x31, SignalKind::PanIdConflict),
    (0x32, SignalKind::NwkStatusIndication),
    (0x35, SignalKind::TcRejoinDone),
    (0x36, SignalKind::PermitJoinStatus),
    (0x37, SignalKind::SteeringCancelled),
    (0x38, SignalKind::FormationCancelled),
];

impl SignalKind {
    /// Decode a raw signal id
    pub fn from_id(id: u8) -> Self {
        SIGNAL_IDS
            .iter()
            .find(|(raw, _)| *raw == id)
            .map(|(_, kind)| *kind)
            .unwrap_or(SignalKind::Unrecognized(id))
    }

    /// Raw signal id
    pub fn id(&self) -> u8 {
        if let SignalKind::Unrecognized(raw) = self {
            return *raw;
        }
        SIGNAL_IDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(raw, _)| *raw)
            .unwrap_or(u8::MAX)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, SignalKind::Unrecognized(_))
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Unrecognized(id) => write!(f, "Unrecognized({:#04x})", id),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A signal notification delivered by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSignal {
    pub kind: SignalKind,
    /// Stack status code; zero means success
    pub status: i32,
    /// Node the signal is about, captured when the stack raised it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<ShortAddr>,
}

impl StackSignal {
    pub fn new(kind: SignalKind, status: i32) -> Self {
        StackSignal {
            kind,
            status,
            addr: None,
        }
    }

    pub fn from_raw(id: u8, status: i32) -> Self {
        StackSignal::new(SignalKind::from_id(id), status)
    }

    pub fn with_addr(mut self, addr: ShortAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_ids_round_trip() {
        for (raw, kind) in SIGNAL_IDS {
            assert_eq!(SignalKind::from_id(*raw), *kind);
            assert_eq!(kind.id(), *raw);
        }
    }

    #[test]
    fn test_unknown_id_is_unrecognized() {
        let kind = SignalKind::from_id(0x7E);
        assert_eq!(kind, SignalKind::Unrecognized(0x7E));
        assert!(!kind.is_recognized());
        assert_eq!(kind.id(), 0x7E);
    }

    #[test]
    fn test_panid_conflict_id() {
        assert_eq!(SignalKind::from_id(0x31), SignalKind::PanIdConflict);
        let signal = StackSignal::from_raw(0x02, 0);
        assert_eq!(signal.kind, SignalKind::DeviceAnnounce);
        assert!(signal.is_success());
        assert!(!StackSignal::from_raw(0x0A, -1).is_success());
    }

    #[test]
    fn test_signal_carries_address() {
        let signal = StackSignal::from_raw(0x02, 0).with_addr(ShortAddr::new(0x1A2B));
        assert_eq!(signal.addr, Some(ShortAddr::new(0x1A2B)));

        let json = serde_json::to_string(&StackSignal::from_raw(0x03, 0)).unwrap();
        assert!(!json.contains("addr"));
        let decoded: StackSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.addr, None);
    }
}
