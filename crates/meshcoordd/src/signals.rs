//! Stack signal routing
//!
//! Translates stack signals into scheduler, registry and self-heal actions.
//! Handling is synchronous: a signal can only enqueue work or arm a run,
//! never wait on the radio.

use meshcoord_discovery::{CommissioningEvent, DiscoveryScheduler, HealAction, HealReason, Hooks};
use meshcoord_protocol::{ShortAddr, SignalKind, StackSignal};
use meshcoord_registry::DeviceRegistry;
use meshcoord_stack::RadioStack;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

use crate::self_heal::SelfHealController;

/// How a signal kind is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalClass {
    /// A node joined or re-announced itself
    Join,
    /// A node left the network
    Leave,
    PanIdConflict,
    /// Joining via network steering; a failure status starts a rejoin
    Steering,
    Formation,
    /// Our own device started or rebooted
    Startup,
}

const SIGNAL_CLASSES: &[(SignalKind, SignalClass)] = &[
    (SignalKind::DeviceAnnounce, SignalClass::Join),
    (SignalKind::DeviceAssociated, SignalClass::Join),
    (SignalKind::DeviceUpdate, SignalClass::Join),
    (SignalKind::DeviceAuthorized, SignalClass::Join),
    (SignalKind::Leave, SignalClass::Leave),
    (SignalKind::LeaveIndication, SignalClass::Leave),
    (SignalKind::PanIdConflict, SignalClass::PanIdConflict),
    (SignalKind::Steering, SignalClass::Steering),
    (SignalKind::SteeringCancelled, SignalClass::Steering),
    (SignalKind::FormationCancelled, SignalClass::Steering),
    (SignalKind::Formation, SignalClass::Formation),
    (SignalKind::DeviceFirstStart, SignalClass::Startup),
    (SignalKind::DeviceReboot, SignalClass::Startup),
];

/// Counters updated from the signal stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommissioningStats {
    pub form_attempts: u64,
    pub form_success: u64,
    pub form_failures: u64,
    pub join_attempts: u64,
    pub join_success: u64,
    pub join_failures: u64,
    pub conflict_events: u64,
    pub leave_events: u64,
    /// When the running join attempt began, if one is in progress
    pub join_started_ms: Option<u64>,
    pub time_to_join_ms: Option<u64>,
    pub ignored: u64,
    pub last_signal: Option<SignalKind>,
    pub last_status: Option<i32>,
}

/// What handling a signal did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Enqueued(ShortAddr),
    /// Join signal that did not produce a new queue entry
    JoinIgnored,
    DeviceLeft { short_addr: ShortAddr, removed: bool },
    SelfHealArmed(HealReason),
    /// Self-heal was not armed (disabled, not started or already running)
    SelfHealSkipped(HealReason),
    Recorded,
    Ignored,
}

/// Everything a signal may act on
pub struct SignalContext<'a> {
    pub stack: &'a dyn RadioStack,
    pub scheduler: &'a mut DiscoveryScheduler,
    pub registry: &'a mut DeviceRegistry,
    pub self_heal: &'a mut SelfHealController,
    pub hooks: &'a mut Hooks,
}

/// Signal dispatcher
#[derive(Debug)]
pub struct SignalRouter {
    table: HashMap<SignalKind, SignalClass>,
    stats: CommissioningStats,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self {
            table: SIGNAL_CLASSES.iter().copied().collect(),
            stats: CommissioningStats::default(),
        }
    }

    pub fn classify(&self, kind: SignalKind) -> Option<SignalClass> {
        self.table.get(&kind).copied()
    }

    pub fn stats(&self) -> &CommissioningStats {
        &self.stats
    }

    /// Count a join attempt started by us; a later start-up signal completes it
    pub fn mark_join_started(&mut self, now_ms: u64) {
        self.stats.join_attempts += 1;
        if self.stats.join_started_ms.is_none() {
            self.stats.join_started_ms = Some(now_ms);
        }
    }

    fn mark_join_success(&mut self, now_ms: u64) {
        self.stats.join_success += 1;
        if let Some(started_ms) = self.stats.join_started_ms.take() {
            self.stats.time_to_join_ms = Some(now_ms.saturating_sub(started_ms));
        }
    }

    pub fn handle(
        &mut self,
        signal: StackSignal,
        ctx: SignalContext<'_>,
        now_ms: u64,
    ) -> SignalAction {
        self.stats.last_signal = Some(signal.kind);
        self.stats.last_status = Some(signal.status);

        let Some(class) = self.classify(signal.kind) else {
            self.stats.ignored += 1;
            trace!("Ignoring signal {} (status {})", signal.kind, signal.status);
            return SignalAction::Ignored;
        };

        match class {
            SignalClass::Join => self.on_join(signal, ctx, now_ms),
            SignalClass::Leave => self.on_leave(signal, ctx, now_ms),
            SignalClass::PanIdConflict => {
                self.stats.conflict_events += 1;
                warn!("PAN ID conflict detected (status {})", signal.status);
                ctx.hooks.emit(CommissioningEvent::PanIdConflict {
                    status: signal.status,
                    at_ms: now_ms,
                });
                Self::arm(ctx.self_heal, HealReason::PanIdConflict, HealAction::Reform, now_ms)
            }
            SignalClass::Steering => {
                self.record(signal, ctx.hooks, now_ms);
                self.stats.join_attempts += 1;
                if signal.is_success() {
                    self.mark_join_success(now_ms);
                    return SignalAction::Recorded;
                }
                self.stats.join_failures += 1;
                warn!("{} failed with status {}", signal.kind, signal.status);
                Self::arm(ctx.self_heal, HealReason::SteeringFailure, HealAction::Rejoin, now_ms)
            }
            SignalClass::Formation => {
                self.record(signal, ctx.hooks, now_ms);
                self.stats.form_attempts += 1;
                if signal.is_success() {
                    self.stats.form_success += 1;
                    info!("Network formed");
                } else {
                    self.stats.form_failures += 1;
                    warn!("Network formation failed with status {}", signal.status);
                }
                SignalAction::Recorded
            }
            SignalClass::Startup => {
                self.record(signal, ctx.hooks, now_ms);
                // A reboot outside a join attempt is not a join
                if signal.is_success() && self.stats.join_started_ms.is_some() {
                    self.mark_join_success(now_ms);
                }
                SignalAction::Recorded
            }
        }
    }

    fn record(&self, signal: StackSignal, hooks: &mut Hooks, now_ms: u64) {
        hooks.emit(CommissioningEvent::Signal {
            kind: signal.kind,
            status: signal.status,
            at_ms: now_ms,
        });
    }

    fn on_join(
        &mut self,
        signal: StackSignal,
        ctx: SignalContext<'_>,
        now_ms: u64,
    ) -> SignalAction {
        if !signal.is_success() || !ctx.scheduler.config().auto_discovery {
            return SignalAction::JoinIgnored;
        }

        let Some(addr) = signal.addr.or_else(|| ctx.stack.last_joined_short_addr()) else {
            debug!("{} without a joined address", signal.kind);
            return SignalAction::JoinIgnored;
        };

        if ctx.scheduler.enqueue(addr, now_ms) {
            SignalAction::Enqueued(addr)
        } else {
            SignalAction::JoinIgnored
        }
    }

    fn on_leave(
        &mut self,
        signal: StackSignal,
        ctx: SignalContext<'_>,
        now_ms: u64,
    ) -> SignalAction {
        self.stats.leave_events += 1;
        if !signal.is_success() {
            debug!("{} failed with status {}", signal.kind, signal.status);
            return SignalAction::Recorded;
        }

        let Some(addr) = signal.addr.or_else(|| ctx.stack.last_left_short_addr()) else {
            debug!("Leave signal without an address");
            return SignalAction::Recorded;
        };

        let removed = ctx.registry.remove(addr).is_some();
        ctx.scheduler.remove(addr);
        info!("Device {} left the network", addr);
        ctx.hooks.emit(CommissioningEvent::DeviceLeft {
            short_addr: addr,
            removed,
            at_ms: now_ms,
        });
        SignalAction::DeviceLeft {
            short_addr: addr,
            removed,
        }
    }

    fn arm(
        self_heal: &mut SelfHealController,
        reason: HealReason,
        action: HealAction,
        now_ms: u64,
    ) -> SignalAction {
        if self_heal.trigger(reason, action, now_ms) {
            SignalAction::SelfHealArmed(reason)
        } else {
            SignalAction::SelfHealSkipped(reason)
        }
    }
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelfHealConfig;
    use meshcoord_discovery::DiscoveryConfig;
    use meshcoord_protocol::{IeeeAddr, NodeDescriptors};
    use meshcoord_registry::DiscoveredDevice;
    use meshcoord_stack::SimulatedStack;

    struct Fixture {
        stack: SimulatedStack,
        scheduler: DiscoveryScheduler,
        registry: DeviceRegistry,
        self_heal: SelfHealController,
        hooks: Hooks,
        router: SignalRouter,
    }

    impl Fixture {
        fn new() -> Self {
            let mut self_heal = SelfHealController::new(SelfHealConfig::default());
            self_heal.set_network_started(true);
            Self {
                stack: SimulatedStack::default(),
                scheduler: DiscoveryScheduler::new(DiscoveryConfig::default()),
                registry: DeviceRegistry::default(),
                self_heal,
                hooks: Hooks::new(),
                router: SignalRouter::new(),
            }
        }

        fn handle(&mut self, kind: SignalKind, status: i32, now_ms: u64) -> SignalAction {
            self.dispatch(StackSignal::new(kind, status), now_ms)
        }

        fn dispatch(&mut self, signal: StackSignal, now_ms: u64) -> SignalAction {
            let ctx = SignalContext {
                stack: &self.stack,
                scheduler: &mut self.scheduler,
                registry: &mut self.registry,
                self_heal: &mut self.self_heal,
                hooks: &mut self.hooks,
            };
            self.router.handle(signal, ctx, now_ms)
        }
    }

    #[test]
    fn test_join_enqueues_last_joined() {
        let mut fx = Fixture::new();
        fx.stack.set_last_joined(Some(ShortAddr::new(0x4321)));

        assert_eq!(
            fx.handle(SignalKind::DeviceAnnounce, 0, 0),
            SignalAction::Enqueued(ShortAddr::new(0x4321))
        );
        // Burst of announcements for the same node
        assert_eq!(fx.handle(SignalKind::DeviceUpdate, 0, 10), SignalAction::JoinIgnored);
        assert_eq!(fx.scheduler.len(), 1);
        assert_eq!(fx.scheduler.stats().debounced, 1);
    }

    #[test]
    fn test_join_prefers_signal_address() {
        let mut fx = Fixture::new();
        let first = ShortAddr::new(0x1111);
        let second = ShortAddr::new(0x2222);
        // The stack has moved on to the second joiner before either signal is handled
        fx.stack.set_last_joined(Some(second));

        let announce = StackSignal::new(SignalKind::DeviceAnnounce, 0);
        assert_eq!(fx.dispatch(announce.with_addr(first), 0), SignalAction::Enqueued(first));
        assert_eq!(fx.dispatch(announce.with_addr(second), 0), SignalAction::Enqueued(second));
        assert_eq!(fx.scheduler.len(), 2);
        assert_eq!(fx.scheduler.stats().debounced, 0);
    }

    #[test]
    fn test_self_addresses_never_enqueued() {
        let mut fx = Fixture::new();
        for addr in [ShortAddr::COORDINATOR, ShortAddr::BROADCAST, ShortAddr::UNASSIGNED] {
            fx.stack.set_last_joined(Some(addr));
            assert_eq!(fx.handle(SignalKind::DeviceAnnounce, 0, 0), SignalAction::JoinIgnored);
        }
        assert!(fx.scheduler.is_empty());
    }

    #[test]
    fn test_join_respects_status_and_auto_discovery() {
        let mut fx = Fixture::new();
        fx.stack.set_last_joined(Some(ShortAddr::new(0x0707)));

        assert_eq!(fx.handle(SignalKind::DeviceAuthorized, -1, 0), SignalAction::JoinIgnored);

        fx.scheduler.set_auto_discovery(false);
        assert_eq!(fx.handle(SignalKind::DeviceAssociated, 0, 0), SignalAction::JoinIgnored);
        assert!(fx.scheduler.is_empty());
    }

    #[test]
    fn test_leave_removes_device_and_pending() {
        let mut fx = Fixture::new();
        let gone = ShortAddr::new(0x0505);
        fx.registry.upsert(DiscoveredDevice::from_descriptors(
            NodeDescriptors::new(gone, IeeeAddr::default()),
            0,
        ));
        fx.scheduler.enqueue(gone, 0);
        fx.stack.leave_node(gone);

        assert_eq!(
            fx.handle(SignalKind::LeaveIndication, 0, 5),
            SignalAction::DeviceLeft {
                short_addr: gone,
                removed: true
            }
        );
        assert!(fx.registry.get(gone).is_none());
        assert!(!fx.scheduler.contains(gone));
        assert_eq!(fx.router.stats().leave_events, 1);
    }

    #[test]
    fn test_leave_uses_signal_address() {
        let mut fx = Fixture::new();
        let first = ShortAddr::new(0x0601);
        let second = ShortAddr::new(0x0602);
        for addr in [first, second] {
            fx.registry.upsert(DiscoveredDevice::from_descriptors(
                NodeDescriptors::new(addr, IeeeAddr::default()),
                0,
            ));
        }
        fx.stack.leave_node(first);
        fx.stack.leave_node(second);

        let leave = StackSignal::new(SignalKind::LeaveIndication, 0);
        fx.dispatch(leave.with_addr(first), 1);
        fx.dispatch(leave.with_addr(second), 1);
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn test_failed_leave_keeps_device() {
        let mut fx = Fixture::new();
        let addr = ShortAddr::new(0x0505);
        fx.registry.upsert(DiscoveredDevice::from_descriptors(
            NodeDescriptors::new(addr, IeeeAddr::default()),
            0,
        ));
        fx.stack.leave_node(addr);

        let failed = StackSignal::new(SignalKind::Leave, -1).with_addr(addr);
        assert_eq!(fx.dispatch(failed, 5), SignalAction::Recorded);
        assert!(fx.registry.contains(addr));
        assert_eq!(fx.router.stats().leave_events, 1);
    }

    #[test]
    fn test_pan_conflict_arms_reform() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.handle(SignalKind::PanIdConflict, 0, 0),
            SignalAction::SelfHealArmed(HealReason::PanIdConflict)
        );
        assert_eq!(fx.self_heal.active_run().map(|r| r.action), Some(HealAction::Reform));

        assert_eq!(
            fx.handle(SignalKind::from_id(0x31), 0, 1),
            SignalAction::SelfHealSkipped(HealReason::PanIdConflict)
        );
        assert_eq!(fx.self_heal.stats().coalesced, 1);
        assert_eq!(fx.router.stats().conflict_events, 2);
    }

    #[test]
    fn test_steering_failure_arms_rejoin() {
        let mut fx = Fixture::new();
        assert_eq!(fx.handle(SignalKind::Steering, 0, 0), SignalAction::Recorded);
        assert!(!fx.self_heal.is_in_flight());

        assert_eq!(
            fx.handle(SignalKind::SteeringCancelled, -1, 0),
            SignalAction::SelfHealArmed(HealReason::SteeringFailure)
        );
        assert_eq!(fx.self_heal.active_run().map(|r| r.action), Some(HealAction::Rejoin));

        let stats = fx.router.stats();
        assert_eq!(stats.join_attempts, 2);
        assert_eq!(stats.join_success, 1);
        assert_eq!(stats.join_failures, 1);
    }

    #[test]
    fn test_formation_counters() {
        let mut fx = Fixture::new();
        fx.handle(SignalKind::Formation, 0, 0);
        fx.handle(SignalKind::Formation, 5, 0);

        let stats = fx.router.stats();
        assert_eq!(stats.form_attempts, 2);
        assert_eq!(stats.form_success, 1);
        assert_eq!(stats.form_failures, 1);
        assert_eq!(stats.last_status, Some(5));
    }

    #[test]
    fn test_reboot_counts_as_join_only_while_joining() {
        let mut fx = Fixture::new();
        fx.handle(SignalKind::DeviceReboot, 0, 0);
        fx.handle(SignalKind::DeviceFirstStart, 0, 10);
        assert_eq!(fx.router.stats().join_attempts, 0);
        assert_eq!(fx.router.stats().join_success, 0);

        fx.router.mark_join_started(100);
        fx.handle(SignalKind::DeviceFirstStart, -1, 150);
        assert_eq!(fx.router.stats().join_success, 0);
        fx.handle(SignalKind::DeviceFirstStart, 0, 400);

        let stats = fx.router.stats();
        assert_eq!(stats.join_attempts, 1);
        assert_eq!(stats.join_success, 1);
        assert_eq!(stats.join_started_ms, None);
        assert_eq!(stats.time_to_join_ms, Some(300));
    }

    #[test]
    fn test_unknown_signal_ignored() {
        let mut fx = Fixture::new();
        assert_eq!(fx.handle(SignalKind::from_id(0x7F), 0, 0), SignalAction::Ignored);
        assert_eq!(fx.handle(SignalKind::CanSleep, 0, 0), SignalAction::Ignored);
        assert_eq!(fx.router.stats().ignored, 2);
        assert!(fx.scheduler.is_empty());
    }
}
