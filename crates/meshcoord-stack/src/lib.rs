//! meshcoord Radio Stack Interface
//!
//! The coordinator core never talks to a radio directly. It drives a
//! [`RadioStack`] implementation, which owns frame encoding, security and
//! over-the-air timing, and reports network events as [`StackSignal`]s.
//!
//! [`SimulatedStack`] is an in-memory implementation used by the daemon's
//! simulation mode and by tests.
//!
//! [`StackSignal`]: meshcoord_protocol::StackSignal

pub mod capabilities;
pub mod error;
pub mod sim;
pub mod stack;

pub use capabilities::{StackCapabilities, StackFeatures};
pub use error::{Result, StackError};
pub use sim::SimulatedStack;
pub use stack::{DiscoveryRequest, NetworkInfo, RadioStack};
