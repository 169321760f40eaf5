//! In-memory radio stack
//!
//! Nodes are registered with the descriptors they answer discovery with.
//! Failures are scripted per address or per operation, so callers can
//! exercise retry paths deterministically.

use meshcoord_protocol::{
    ChannelMask, IeeeAddr, NodeDescriptors, PanId, ShortAddr, SignalKind, StackSignal,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::capabilities::{StackCapabilities, StackFeatures};
use crate::error::{Result, StackError};
use crate::stack::{DiscoveryRequest, NetworkInfo, RadioStack};

const SIGNAL_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_PAN_ID: u16 = 0x1A62;

/// A node known to the simulated network
#[derive(Debug, Clone)]
struct SimNode {
    descriptors: NodeDescriptors,
    reject_power_desc: bool,
    partial_error: Option<String>,
}

#[derive(Debug)]
struct SimState {
    started: bool,
    formed: bool,
    local_short: ShortAddr,
    local_ieee: IeeeAddr,
    channel_mask: ChannelMask,
    pan_id: Option<PanId>,
    extended_pan_id: Option<IeeeAddr>,
    permit_join_s: u8,
    nodes: BTreeMap<ShortAddr, SimNode>,
    discovery_failures: HashMap<ShortAddr, u32>,
    start_failures: u32,
    steering_failures: u32,
    last_joined: Option<ShortAddr>,
    last_left: Option<ShortAddr>,
    response_delay: Option<Duration>,
    command_delay: Option<Duration>,

    // Call accounting for assertions
    discover_calls: HashMap<ShortAddr, u32>,
    start_calls: Vec<bool>,
    steering_calls: u32,
    permit_join_calls: Vec<u8>,
}

impl SimState {
    fn discovery_result(
        &mut self,
        addr: ShortAddr,
        request: &DiscoveryRequest,
    ) -> Result<NodeDescriptors> {
        if let Some(remaining) = self.discovery_failures.get_mut(&addr) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StackError::NoResponse(addr));
            }
        }

        let node = self.nodes.get(&addr).ok_or(StackError::NoResponse(addr))?;

        if request.include_power_desc && node.reject_power_desc {
            return Err(StackError::DiscoveryFailed {
                addr,
                reason: "power descriptor request rejected".to_string(),
            });
        }

        let mut descriptors = node.descriptors.clone();
        if !request.include_power_desc {
            descriptors.power = None;
        }

        if let Some(error) = &node.partial_error {
            if request.strict {
                return Err(StackError::DiscoveryFailed {
                    addr,
                    reason: error.clone(),
                });
            }
            descriptors.power = None;
            descriptors.errors.push(error.clone());
        }

        Ok(descriptors)
    }
}

/// Simulated radio stack
pub struct SimulatedStack {
    capabilities: StackCapabilities,
    state: Mutex<SimState>,
    signals: broadcast::Sender<StackSignal>,
}

impl SimulatedStack {
    pub fn new(capabilities: StackCapabilities) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let state = SimState {
            started: false,
            formed: false,
            local_short: ShortAddr::UNASSIGNED,
            local_ieee: IeeeAddr::from_bytes([0x00, 0x12, 0x4b, 0x00, 0x00, 0x00, 0x00, 0x01]),
            channel_mask: ChannelMask::ALL,
            pan_id: None,
            extended_pan_id: None,
            permit_join_s: 0,
            nodes: BTreeMap::new(),
            discovery_failures: HashMap::new(),
            start_failures: 0,
            steering_failures: 0,
            last_joined: None,
            last_left: None,
            response_delay: None,
            command_delay: None,
            discover_calls: HashMap::new(),
            start_calls: Vec::new(),
            steering_calls: 0,
            permit_join_calls: Vec::new(),
        };

        SimulatedStack {
            capabilities,
            state: Mutex::new(state),
            signals,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a node without announcing it
    pub fn add_node(&self, descriptors: NodeDescriptors) {
        let addr = descriptors.short_addr;
        self.state().nodes.insert(
            addr,
            SimNode {
                descriptors,
                reject_power_desc: false,
                partial_error: None,
            },
        );
    }

    /// Register a node and emit a device-announce signal for it
    pub fn join_node(&self, descriptors: NodeDescriptors) {
        let addr = descriptors.short_addr;
        self.add_node(descriptors);
        self.state().last_joined = Some(addr);
        debug!("Simulated join of {}", addr);
        self.send(StackSignal::new(SignalKind::DeviceAnnounce, 0).with_addr(addr));
    }

    /// Re-announce a node that is already registered
    pub fn announce(&self, addr: ShortAddr) {
        self.state().last_joined = Some(addr);
        self.send(StackSignal::new(SignalKind::DeviceAnnounce, 0).with_addr(addr));
    }

    /// Remove a node and emit a leave-indication signal for it
    pub fn leave_node(&self, addr: ShortAddr) {
        {
            let mut state = self.state();
            state.nodes.remove(&addr);
            state.last_left = Some(addr);
        }
        debug!("Simulated leave of {}", addr);
        self.send(StackSignal::new(SignalKind::LeaveIndication, 0).with_addr(addr));
    }

    /// Emit a signal that names no node
    pub fn emit_signal(&self, kind: SignalKind, status: i32) {
        self.send(StackSignal::new(kind, status));
    }

    pub fn send(&self, signal: StackSignal) {
        // No subscribers is not an error for the radio
        let _ = self.signals.send(signal);
    }

    pub fn set_last_joined(&self, addr: Option<ShortAddr>) {
        self.state().last_joined = addr;
    }

    /// Fail the next `times` discovery rounds for `addr`
    pub fn fail_discovery(&self, addr: ShortAddr, times: u32) {
        self.state().discovery_failures.insert(addr, times);
    }

    /// Make `addr` reject discovery rounds that ask for its power descriptor
    pub fn reject_power_descriptor(&self, addr: ShortAddr) {
        if let Some(node) = self.state().nodes.get_mut(&addr) {
            node.reject_power_desc = true;
        }
    }

    /// Make `addr` answer with partial descriptors
    pub fn set_partial(&self, addr: ShortAddr, error: impl Into<String>) {
        if let Some(node) = self.state().nodes.get_mut(&addr) {
            node.partial_error = Some(error.into());
        }
    }

    pub fn fail_start(&self, times: u32) {
        self.state().start_failures = times;
    }

    pub fn fail_steering(&self, times: u32) {
        self.state().steering_failures = times;
    }

    /// Delay every discovery response
    pub fn set_response_delay(&self, delay: Option<Duration>) {
        self.state().response_delay = delay;
    }

    /// Delay start, steering and permit-join before they take effect
    pub fn set_command_delay(&self, delay: Option<Duration>) {
        self.state().command_delay = delay;
    }

    async fn command_delay(&self) {
        let delay = self.state().command_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn discover_calls(&self, addr: ShortAddr) -> u32 {
        self.state().discover_calls.get(&addr).copied().unwrap_or(0)
    }

    /// `form_network` argument of every `start` call, in order
    pub fn start_calls(&self) -> Vec<bool> {
        self.state().start_calls.clone()
    }

    pub fn steering_calls(&self) -> u32 {
        self.state().steering_calls
    }

    pub fn permit_join_calls(&self) -> Vec<u8> {
        self.state().permit_join_calls.clone()
    }

    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new(StackCapabilities::full())
    }
}

#[async_trait::async_trait]
impl RadioStack for SimulatedStack {
    fn capabilities(&self) -> StackCapabilities {
        self.capabilities
    }

    async fn start(&self, form_network: bool) -> Result<()> {
        self.command_delay().await;
        {
            let mut state = self.state();
            state.start_calls.push(form_network);

            if state.start_failures > 0 {
                state.start_failures -= 1;
                return Err(StackError::StartFailed("simulated start failure".to_string()));
            }

            state.started = true;
            if form_network {
                state.formed = true;
                state.local_short = ShortAddr::COORDINATOR;
                if state.pan_id.is_none() {
                    state.pan_id = PanId::new(DEFAULT_PAN_ID).ok();
                }
            }
        }

        let kind = if form_network {
            SignalKind::Formation
        } else {
            SignalKind::DeviceFirstStart
        };
        self.emit_signal(kind, 0);
        Ok(())
    }

    async fn start_network_steering(&self) -> Result<()> {
        if !self.capabilities.supports(StackFeatures::NETWORK_STEERING) {
            return Err(StackError::Unsupported("network steering"));
        }

        self.command_delay().await;
        {
            let mut state = self.state();
            state.steering_calls += 1;
            if state.steering_failures > 0 {
                state.steering_failures -= 1;
                return Err(StackError::CommandFailed("simulated steering failure".to_string()));
            }
            state.started = true;
        }

        self.emit_signal(SignalKind::Steering, 0);
        Ok(())
    }

    async fn permit_join(&self, duration_s: u8) -> Result<()> {
        self.command_delay().await;
        let mut state = self.state();
        if !state.started {
            return Err(StackError::NotStarted);
        }
        state.permit_join_s = duration_s;
        state.permit_join_calls.push(duration_s);
        Ok(())
    }

    async fn discover_descriptors(
        &self,
        addr: ShortAddr,
        request: &DiscoveryRequest,
    ) -> Result<NodeDescriptors> {
        let (result, delay) = {
            let mut state = self.state();
            *state.discover_calls.entry(addr).or_insert(0) += 1;
            (state.discovery_result(addr, request), state.response_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        result
    }

    fn subscribe_signals(&self) -> broadcast::Receiver<StackSignal> {
        self.signals.subscribe()
    }

    fn short_addr(&self) -> Option<ShortAddr> {
        let state = self.state();
        state.started.then_some(state.local_short)
    }

    fn ieee_addr(&self) -> Option<IeeeAddr> {
        Some(self.state().local_ieee)
    }

    fn last_joined_short_addr(&self) -> Option<ShortAddr> {
        if !self.capabilities.supports(StackFeatures::LAST_JOINED_HINT) {
            return None;
        }
        self.state().last_joined
    }

    fn last_left_short_addr(&self) -> Option<ShortAddr> {
        if !self.capabilities.supports(StackFeatures::LEAVE_ADDRESS) {
            return None;
        }
        self.state().last_left
    }

    fn network_info(&self) -> NetworkInfo {
        let state = self.state();
        let channel = if state.formed {
            state
                .channel_mask
                .single_channel()
                .or_else(|| state.channel_mask.channels().first().copied())
        } else {
            None
        };

        NetworkInfo {
            started: state.started,
            formed: state.formed,
            short_addr: state.started.then_some(state.local_short),
            ieee_addr: Some(state.local_ieee),
            channel,
            pan_id: state.pan_id.map(|p| p.as_u16()),
            extended_pan_id: state.extended_pan_id,
            permit_join_s: state.permit_join_s,
        }
    }

    async fn set_primary_channel_mask(&self, mask: ChannelMask) -> Result<()> {
        if !self.capabilities.supports(StackFeatures::NETWORK_IDENTITY) {
            return Err(StackError::Unsupported("channel mask"));
        }
        self.state().channel_mask = mask;
        Ok(())
    }

    async fn set_pan_id(&self, pan_id: PanId) -> Result<()> {
        if !self.capabilities.supports(StackFeatures::NETWORK_IDENTITY) {
            return Err(StackError::Unsupported("pan id"));
        }
        self.state().pan_id = Some(pan_id);
        Ok(())
    }

    async fn set_extended_pan_id(&self, extended_pan_id: IeeeAddr) -> Result<()> {
        if !self.capabilities.supports(StackFeatures::NETWORK_IDENTITY) {
            return Err(StackError::Unsupported("extended pan id"));
        }
        self.state().extended_pan_id = Some(extended_pan_id);
        Ok(())
    }
}
