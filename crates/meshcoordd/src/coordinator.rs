//! Coordinator facade
//!
//! Owns the radio stack handle and every piece of coordinator state. All
//! mutation goes through `&mut self`, so one driving loop calling
//! [`Coordinator::tick`] is the only thread of control.

use meshcoord_discovery::{
    register, AttemptOutcome, CommissioningEvent, DiscoveryError, DiscoveryScheduler,
    DiscoveryStats, Hooks, PendingDiscoveryEntry, ProcessReport,
};
use meshcoord_protocol::{IeeeAddr, ShortAddr, StackSignal};
use meshcoord_registry::{
    DeviceQuery, DeviceRegistry, DiscoveredDevice, Feature, Lifecycle, RegistrySnapshot,
};
use meshcoord_stack::{NetworkInfo, RadioStack, StackFeatures};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::self_heal::{SelfHealController, SelfHealStats};
use crate::signals::{CommissioningStats, SignalAction, SignalContext, SignalRouter};

/// What one [`Coordinator::tick`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Signals drained from the stack
    pub signals: usize,
    /// Signals lost because the buffer overflowed
    pub lagged: u64,
    pub self_heal: Option<AttemptOutcome>,
    /// Address queued from the stack's last-joined hint
    pub hinted: Option<ShortAddr>,
    pub discovery: ProcessReport,
}

pub struct Coordinator {
    stack: Arc<dyn RadioStack>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    registry: DeviceRegistry,
    scheduler: DiscoveryScheduler,
    self_heal: SelfHealController,
    router: SignalRouter,
    hooks: Hooks,
    signals: Option<broadcast::Receiver<StackSignal>>,
    last_hint: Option<ShortAddr>,
    started: bool,
}

impl Coordinator {
    /// Build a coordinator; configuration is validated and timing normalized
    pub fn new(
        stack: Arc<dyn RadioStack>,
        mut config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        config.normalize();

        Ok(Self {
            registry: DeviceRegistry::new(config.lifecycle.offline_after_ms),
            scheduler: DiscoveryScheduler::new(config.discovery.clone()),
            self_heal: SelfHealController::new(config.self_heal.clone()),
            router: SignalRouter::new(),
            hooks: Hooks::new(),
            signals: None,
            last_hint: None,
            started: false,
            stack,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ===== Network =====

    /// Apply the configured identity, subscribe to signals and start the stack
    pub async fn start(&mut self, form_network: bool) -> Result<()> {
        if let Some(identity) = self.config.network.identity()? {
            if self
                .stack
                .capabilities()
                .supports(StackFeatures::NETWORK_IDENTITY)
            {
                self.stack
                    .set_primary_channel_mask(identity.channel_mask)
                    .await?;
                if let Some(pan_id) = identity.pan_id {
                    self.stack.set_pan_id(pan_id).await?;
                }
                if let Some(extended_pan_id) = identity.extended_pan_id {
                    self.stack.set_extended_pan_id(extended_pan_id).await?;
                }
                debug!("Applied fixed network identity: {:?}", identity);
            } else {
                warn!("Stack cannot set network identity, using its own choice");
            }
        }

        // Subscribe first so the start-up signal is not missed
        if self.signals.is_none() {
            self.signals = Some(self.stack.subscribe_signals());
        }

        if !form_network {
            let now_ms = self.now_ms();
            self.router.mark_join_started(now_ms);
        }
        self.stack.start(form_network).await?;
        self.started = true;
        self.self_heal.set_network_started(true);

        info!(
            "Coordinator started ({} network)",
            if form_network { "formed" } else { "joined" }
        );
        Ok(())
    }

    /// Open joining; `auto_discover` also switches join-triggered discovery
    pub async fn permit_join(
        &mut self,
        duration_s: u8,
        auto_discover: Option<bool>,
    ) -> Result<()> {
        if !self.started {
            return Err(CoordinatorError::NotStarted);
        }
        if let Some(enabled) = auto_discover {
            self.scheduler.set_auto_discovery(enabled);
            self.config.discovery.auto_discovery = enabled;
        }

        self.stack.permit_join(duration_s).await?;
        info!("Permit join open for {} s", duration_s);
        Ok(())
    }

    pub fn network_info(&self) -> NetworkInfo {
        self.stack.network_info()
    }

    // ===== Discovery =====

    pub fn enqueue(&mut self, addr: ShortAddr) -> bool {
        let now_ms = self.now_ms();
        self.scheduler.enqueue(addr, now_ms)
    }

    pub async fn process_pending(&mut self, max_items: usize) -> ProcessReport {
        let now_ms = self.now_ms();
        self.scheduler
            .process(
                self.stack.as_ref(),
                &mut self.registry,
                &mut self.hooks,
                max_items,
                now_ms,
            )
            .await
    }

    pub fn pending(&self) -> Vec<PendingDiscoveryEntry> {
        self.scheduler.pending()
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.scheduler.stats()
    }

    pub fn set_discovery_timing(&mut self, discover_timeout_ms: u64, discover_poll_ms: u64) {
        self.scheduler.set_timing(discover_timeout_ms, discover_poll_ms);
        self.config.discovery = self.scheduler.config().clone();
    }

    /// One round of cooperative work
    pub async fn tick(&mut self, max_items: usize) -> TickReport {
        let mut report = TickReport::default();

        let (signals, lagged) = self.drain_signals();
        report.signals = signals.len();
        report.lagged = lagged;
        let now_ms = self.now_ms();
        for signal in signals {
            self.dispatch(signal, now_ms);
        }

        report.self_heal = self
            .self_heal
            .poll(self.stack.as_ref(), &mut self.hooks, now_ms)
            .await;

        report.hinted = self.queue_last_joined_hint(now_ms);
        report.discovery = self.process_pending(max_items).await;
        report
    }

    fn drain_signals(&mut self) -> (Vec<StackSignal>, u64) {
        let mut drained = Vec::new();
        let mut lagged = 0;
        let mut closed = false;
        let Some(rx) = self.signals.as_mut() else {
            return (drained, lagged);
        };

        loop {
            match rx.try_recv() {
                Ok(signal) => drained.push(signal),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("Signal buffer overflowed, {} signal(s) lost", missed);
                    lagged += missed;
                }
                Err(TryRecvError::Closed) => {
                    warn!("Stack signal channel closed");
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            self.signals = None;
        }
        (drained, lagged)
    }

    /// Queue the stack's most recent joiner once, if nothing else knows it
    fn queue_last_joined_hint(&mut self, now_ms: u64) -> Option<ShortAddr> {
        let discovery = self.scheduler.config();
        if !discovery.last_joined_hint || !discovery.auto_discovery {
            return None;
        }

        let addr = self.stack.last_joined_short_addr()?;
        if self.last_hint == Some(addr) {
            return None;
        }
        self.last_hint = Some(addr);

        if self.registry.contains(addr) || self.scheduler.contains(addr) {
            return None;
        }
        self.scheduler.enqueue(addr, now_ms).then_some(addr)
    }

    /// Discover one device now
    ///
    /// `strict` defaults to the configured `strict_discovery`. Strict mode
    /// returns the failure; otherwise partial descriptors are accepted and a
    /// failed address is queued for background retry.
    pub async fn discover_device(
        &mut self,
        addr: ShortAddr,
        strict: Option<bool>,
    ) -> Result<Option<DiscoveredDevice>> {
        let strict = strict.unwrap_or(self.config.discovery.strict_discovery);
        let now_ms = self.now_ms();

        match self
            .scheduler
            .discover(self.stack.as_ref(), addr, strict)
            .await
        {
            Ok(descriptors) => {
                self.scheduler.remove(addr);
                register(&mut self.registry, &mut self.hooks, descriptors, now_ms);
                Ok(self.registry.get(addr).cloned())
            }
            Err(err @ DiscoveryError::InvalidAddress(_)) => Err(err.into()),
            Err(err) if strict => Err(err.into()),
            Err(err) => {
                warn!("Manual discovery of {} failed ({}), queued for retry", addr, err);
                self.scheduler.enqueue(addr, now_ms);
                Ok(None)
            }
        }
    }

    /// Tick until a device matching `query` is registered or `timeout` passes
    pub async fn wait_for_device(
        &mut self,
        query: &DeviceQuery,
        timeout: Duration,
    ) -> Option<DiscoveredDevice> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let batch = self.scheduler.len().max(1);
            self.tick(batch).await;

            let now_ms = self.now_ms();
            if let Some(device) = self.registry.find(query, now_ms).into_iter().next() {
                return Some(device.clone());
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let poll = Duration::from_millis(self.scheduler.config().discover_poll_ms);
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }

    // ===== Signals =====

    /// Feed a raw signal; never waits on the radio
    pub fn handle_signal(&mut self, signal_id: u8, status: i32) -> SignalAction {
        let now_ms = self.now_ms();
        self.dispatch(StackSignal::from_raw(signal_id, status), now_ms)
    }

    fn dispatch(&mut self, signal: StackSignal, now_ms: u64) -> SignalAction {
        let ctx = SignalContext {
            stack: self.stack.as_ref(),
            scheduler: &mut self.scheduler,
            registry: &mut self.registry,
            self_heal: &mut self.self_heal,
            hooks: &mut self.hooks,
        };
        self.router.handle(signal, ctx, now_ms)
    }

    pub fn commissioning_stats(&self) -> &CommissioningStats {
        self.router.stats()
    }

    pub fn self_heal_stats(&self) -> &SelfHealStats {
        self.self_heal.stats()
    }

    pub fn recent_self_heal_attempts(&self) -> Vec<AttemptOutcome> {
        self.self_heal.recent_attempts().cloned().collect()
    }

    // ===== Devices =====

    pub fn get_device(&self, addr: ShortAddr) -> Option<&DiscoveredDevice> {
        self.registry.get(addr)
    }

    pub fn get_device_by_ieee(&self, ieee_addr: &IeeeAddr) -> Option<&DiscoveredDevice> {
        self.registry.get_by_ieee(ieee_addr)
    }

    /// Devices in ascending address order, optionally filtered by online state
    pub fn list_devices(&self, online: Option<bool>) -> Vec<&DiscoveredDevice> {
        let now_ms = self.now_ms();
        let offline_after_ms = self.registry.offline_after_ms();
        self.registry
            .list()
            .filter(|d| online.map_or(true, |o| d.is_online(offline_after_ms, now_ms) == o))
            .collect()
    }

    pub fn select_device(&self, feature: Feature) -> Option<&DiscoveredDevice> {
        self.registry.select(feature)
    }

    pub fn find_devices(&self, query: &DeviceQuery) -> Vec<&DiscoveredDevice> {
        self.registry.find(query, self.now_ms())
    }

    pub fn device_status(&self, addr: ShortAddr) -> Result<Lifecycle> {
        self.registry
            .lifecycle(addr, self.now_ms())
            .ok_or(CoordinatorError::DeviceNotFound(addr))
    }

    /// Record traffic from a device
    pub fn touch_device(&mut self, addr: ShortAddr) -> bool {
        let now_ms = self.now_ms();
        self.registry.touch(addr, now_ms)
    }

    pub fn mark_device_offline(
        &mut self,
        addr: ShortAddr,
        reason: Option<String>,
    ) -> Result<Lifecycle> {
        let now_ms = self.now_ms();
        Ok(self.registry.mark_offline(addr, reason, now_ms)?)
    }

    pub fn mark_device_online(&mut self, addr: ShortAddr) -> Result<Lifecycle> {
        let now_ms = self.now_ms();
        Ok(self.registry.mark_online(addr, now_ms)?)
    }

    /// Forget a device and any pending discovery for it
    pub fn evict_device(&mut self, addr: ShortAddr) -> Option<DiscoveredDevice> {
        self.scheduler.remove(addr);
        let removed = self.registry.remove(addr);
        if removed.is_some() {
            info!("Evicted device {}", addr);
        }
        removed
    }

    pub fn registry_snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot(self.now_ms())
    }

    // ===== Callbacks =====

    pub fn on_device_added(&mut self, callback: impl FnMut(&DiscoveredDevice) + Send + 'static) {
        self.hooks.set_on_device_added(Some(Box::new(callback)));
    }

    pub fn on_device_updated(&mut self, callback: impl FnMut(&DiscoveredDevice) + Send + 'static) {
        self.hooks.set_on_device_updated(Some(Box::new(callback)));
    }

    pub fn on_commissioning_event(
        &mut self,
        callback: impl FnMut(&CommissioningEvent) + Send + 'static,
    ) {
        self.hooks.set_on_commissioning_event(Some(Box::new(callback)));
    }

    pub fn clear_callbacks(&mut self) {
        self.hooks = Hooks::new();
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("started", &self.started)
            .field("devices", &self.registry.len())
            .field("pending", &self.scheduler.len())
            .field("self_heal_in_flight", &self.self_heal.is_in_flight())
            .finish()
    }
}
