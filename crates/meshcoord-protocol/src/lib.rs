//! meshcoord Protocol Module
//!
//! Shared vocabulary between the radio stack and the coordinator core:
//! network addresses, ZCL cluster identifiers, stack signals and the
//! ZDO descriptor shapes returned by device discovery.

pub mod cluster;
pub mod descriptor;
pub mod error;
pub mod signal;
pub mod types;

pub use descriptor::{EndpointDescriptor, NodeDescriptor, NodeDescriptors, PowerDescriptor};
pub use error::{ProtocolError, Result};
pub use signal::{SignalKind, StackSignal};
pub use types::{ChannelMask, ClusterId, EndpointId, IeeeAddr, PanId, ShortAddr};
