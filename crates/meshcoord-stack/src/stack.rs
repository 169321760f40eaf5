//! Radio stack trait

use meshcoord_protocol::{ChannelMask, IeeeAddr, NodeDescriptors, PanId, ShortAddr, StackSignal};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::capabilities::StackCapabilities;
use crate::error::Result;

/// Parameters of a single descriptor discovery round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Also request the node's power descriptor
    pub include_power_desc: bool,

    /// Budget for the whole round, in milliseconds
    pub timeout_ms: u64,

    /// Interval at which the stack polls for responses
    pub poll_ms: u64,

    /// Fail on any missing descriptor instead of returning a partial result
    pub strict: bool,
}

impl Default for DiscoveryRequest {
    fn default() -> Self {
        DiscoveryRequest {
            include_power_desc: false,
            timeout_ms: 5000,
            poll_ms: 200,
            strict: false,
        }
    }
}

/// Current network parameters as reported by the stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub started: bool,
    pub formed: bool,
    pub short_addr: Option<ShortAddr>,
    pub ieee_addr: Option<IeeeAddr>,
    pub channel: Option<u8>,
    pub pan_id: Option<u16>,
    pub extended_pan_id: Option<IeeeAddr>,
    /// Seconds left in the current permit-join window
    pub permit_join_s: u8,
}

/// Radio stack trait
///
/// Accessors that the signal path needs are synchronous; anything that
/// waits on the radio is async.
#[async_trait::async_trait]
pub trait RadioStack: Send + Sync {
    /// Supported optional features
    fn capabilities(&self) -> StackCapabilities;

    /// Start the stack, forming a new network when `form_network` is set
    async fn start(&self, form_network: bool) -> Result<()>;

    /// Search for and join an existing network
    async fn start_network_steering(&self) -> Result<()>;

    /// Open the network for joining; zero closes it
    async fn permit_join(&self, duration_s: u8) -> Result<()>;

    /// Query node, simple and (optionally) power descriptors of a node
    async fn discover_descriptors(
        &self,
        addr: ShortAddr,
        request: &DiscoveryRequest,
    ) -> Result<NodeDescriptors>;

    /// Subscribe to signal notifications
    fn subscribe_signals(&self) -> broadcast::Receiver<StackSignal>;

    /// Our own short address, once the network is up
    fn short_addr(&self) -> Option<ShortAddr>;

    /// Our own IEEE address
    fn ieee_addr(&self) -> Option<IeeeAddr>;

    /// Short address of the most recently joined node
    fn last_joined_short_addr(&self) -> Option<ShortAddr>;

    /// Short address of the most recent node to leave
    fn last_left_short_addr(&self) -> Option<ShortAddr>;

    fn network_info(&self) -> NetworkInfo;

    async fn set_primary_channel_mask(&self, mask: ChannelMask) -> Result<()>;

    async fn set_pan_id(&self, pan_id: PanId) -> Result<()>;

    async fn set_extended_pan_id(&self, extended_pan_id: IeeeAddr) -> Result<()>;
}
