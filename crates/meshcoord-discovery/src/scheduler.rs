//! Pending discovery queue

use meshcoord_protocol::{NodeDescriptors, ShortAddr};
use meshcoord_registry::{DeviceRegistry, DiscoveredDevice, UpsertOutcome};
use meshcoord_stack::{DiscoveryRequest, RadioStack, StackFeatures};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::events::{AttemptOutcome, AttemptTarget, CommissioningEvent, Hooks};
use crate::stats::{DiscoveryStats, ProcessReport};

/// One address awaiting discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingDiscoveryEntry {
    pub address: ShortAddr,
    pub queued_at_ms: u64,
    pub next_try_ms: u64,
    /// Failed attempts so far
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingDiscoveryEntry {
    fn new(address: ShortAddr, now_ms: u64) -> Self {
        PendingDiscoveryEntry {
            address,
            queued_at_ms: now_ms,
            next_try_ms: now_ms,
            attempts: 0,
            last_error: None,
        }
    }

    fn is_due(&self, now_ms: u64) -> bool {
        self.next_try_ms <= now_ms
    }
}

/// Debounced, bounded-retry discovery queue
///
/// At most one entry exists per address.
#[derive(Debug)]
pub struct DiscoveryScheduler {
    config: DiscoveryConfig,
    queue: BTreeMap<ShortAddr, PendingDiscoveryEntry>,
    stats: DiscoveryStats,
}

impl DiscoveryScheduler {
    pub fn new(mut config: DiscoveryConfig) -> Self {
        config.normalize_timing();
        DiscoveryScheduler {
            config,
            queue: BTreeMap::new(),
            stats: DiscoveryStats::default(),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn set_timing(&mut self, discover_timeout_ms: u64, discover_poll_ms: u64) {
        self.config.set_timing(discover_timeout_ms, discover_poll_ms);
    }

    pub fn set_auto_discovery(&mut self, enabled: bool) {
        self.config.auto_discovery = enabled;
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, address: ShortAddr) -> bool {
        self.queue.contains_key(&address)
    }

    /// Queue `address` for discovery
    ///
    /// Returns false for non-discoverable addresses and for repeats inside
    /// the debounce window. An entry outside the window is reset.
    pub fn enqueue(&mut self, address: ShortAddr, now_ms: u64) -> bool {
        if !address.is_discoverable() {
            debug!("Ignoring enqueue of reserved address {}", address);
            return false;
        }

        if let Some(entry) = self.queue.get_mut(&address) {
            if now_ms.saturating_sub(entry.queued_at_ms) < self.config.join_debounce_ms {
                self.stats.debounced += 1;
                debug!("Debounced discovery request for {}", address);
                return false;
            }
            *entry = PendingDiscoveryEntry::new(address, now_ms);
            self.stats.refreshed += 1;
            debug!("Refreshed discovery request for {}", address);
            return true;
        }

        if self.queue.len() >= self.config.queue_max {
            self.drop_oldest();
        }

        self.queue.insert(address, PendingDiscoveryEntry::new(address, now_ms));
        self.stats.enqueued += 1;
        debug!("Queued discovery for {} ({} pending)", address, self.queue.len());
        true
    }

    fn drop_oldest(&mut self) {
        let oldest = self
            .queue
            .values()
            .min_by_key(|e| (e.queued_at_ms, e.address))
            .map(|e| e.address);

        if let Some(address) = oldest {
            self.queue.remove(&address);
            self.stats.overflow_dropped += 1;
            warn!("Discovery queue full, dropped oldest entry {}", address);
        }
    }

    /// Drop a pending entry; true if one existed
    pub fn remove(&mut self, address: ShortAddr) -> bool {
        self.queue.remove(&address).is_some()
    }

    /// Outstanding entries, by next try time then address
    pub fn pending(&self) -> Vec<PendingDiscoveryEntry> {
        let mut entries: Vec<PendingDiscoveryEntry> = self.queue.values().cloned().collect();
        entries.sort_by_key(|e| (e.next_try_ms, e.address));
        entries
    }

    /// Earliest time any entry becomes due
    pub fn next_due_ms(&self) -> Option<u64> {
        self.queue.values().map(|e| e.next_try_ms).min()
    }

    fn due_batch(&self, max_items: usize, now_ms: u64) -> Vec<ShortAddr> {
        let mut due: Vec<&PendingDiscoveryEntry> =
            self.queue.values().filter(|e| e.is_due(now_ms)).collect();
        due.sort_by_key(|e| (e.next_try_ms, e.queued_at_ms, e.address));
        due.into_iter().take(max_items).map(|e| e.address).collect()
    }

    /// Attempt up to `max_items` due entries, oldest-due first
    ///
    /// Each entry is tried at most once per call. Failures are absorbed
    /// into the retry schedule and never returned.
    pub async fn process(
        &mut self,
        stack: &dyn RadioStack,
        registry: &mut DeviceRegistry,
        hooks: &mut Hooks,
        max_items: usize,
        now_ms: u64,
    ) -> ProcessReport {
        let mut report = ProcessReport::default();

        for address in self.due_batch(max_items, now_ms) {
            let Some(failures) = self.queue.get(&address).map(|e| e.attempts) else {
                continue;
            };

            report.processed += 1;
            self.stats.attempts += 1;
            let attempt = failures + 1;
            debug!(
                "Discovering {} (attempt {}/{})",
                address, attempt, self.config.retry.max_attempts
            );

            match self.discover(stack, address, false).await {
                Ok(descriptors) => {
                    self.queue.remove(&address);
                    self.stats.success += 1;
                    report.success += 1;

                    register(registry, hooks, descriptors, now_ms);
                    hooks.emit(CommissioningEvent::Attempt(AttemptOutcome {
                        target: AttemptTarget::Discovery(address),
                        attempt,
                        max_attempts: self.config.retry.max_attempts,
                        success: true,
                        error: None,
                        next_try_ms: None,
                        exhausted: false,
                        at_ms: now_ms,
                    }));
                }
                Err(err) => {
                    self.stats.failed += 1;
                    report.failed += 1;
                    if err.is_timeout() {
                        self.stats.timeouts += 1;
                    }

                    let next_try_ms = self.reschedule(address, failures, &err, now_ms);
                    hooks.emit(CommissioningEvent::Attempt(AttemptOutcome {
                        target: AttemptTarget::Discovery(address),
                        attempt,
                        max_attempts: self.config.retry.max_attempts,
                        success: false,
                        error: Some(err.to_string()),
                        next_try_ms,
                        exhausted: next_try_ms.is_none(),
                        at_ms: now_ms,
                    }));
                }
            }
        }

        report.queue_depth = self.queue.len();
        report
    }

    /// Requeue with backoff or drop; returns the next try time if requeued
    fn reschedule(
        &mut self,
        address: ShortAddr,
        failures: u32,
        err: &DiscoveryError,
        now_ms: u64,
    ) -> Option<u64> {
        let policy = self.config.retry;

        if !policy.can_retry(failures) {
            self.queue.remove(&address);
            self.stats.abandoned += 1;
            warn!(
                "Giving up on discovery of {} after {} attempt(s): {}",
                address,
                failures + 1,
                err
            );
            return None;
        }

        let backoff = policy.delay_for(failures);
        let entry = self.queue.get_mut(&address)?;
        entry.next_try_ms = now_ms.saturating_add(backoff);
        entry.attempts = failures + 1;
        entry.last_error = Some(err.to_string());
        self.stats.requeued += 1;
        debug!(
            "Discovery of {} failed ({}), retry in {} ms",
            address, err, backoff
        );
        Some(entry.next_try_ms)
    }

    /// One bounded discovery round, with the power-descriptor fallback
    pub async fn discover(
        &self,
        stack: &dyn RadioStack,
        address: ShortAddr,
        strict: bool,
    ) -> Result<NodeDescriptors> {
        if !address.is_discoverable() {
            return Err(DiscoveryError::InvalidAddress(address));
        }

        let want_power = self.config.include_power_desc
            && stack.capabilities().supports(StackFeatures::POWER_DESCRIPTOR);
        let request = self.config.request(want_power, strict);

        match self.discover_bounded(stack, address, &request).await {
            Err(err)
                if want_power
                    && self.config.fallback_without_power_desc
                    && err.allows_power_fallback() =>
            {
                debug!(
                    "Discovery of {} with power descriptor failed ({}), retrying without",
                    address, err
                );
                let fallback = DiscoveryRequest {
                    include_power_desc: false,
                    ..request
                };
                self.discover_bounded(stack, address, &fallback).await
            }
            result => result,
        }
    }

    async fn discover_bounded(
        &self,
        stack: &dyn RadioStack,
        address: ShortAddr,
        request: &DiscoveryRequest,
    ) -> Result<NodeDescriptors> {
        let budget = Duration::from_millis(self.config.discover_timeout_ms);
        match tokio::time::timeout(budget, stack.discover_descriptors(address, request)).await {
            Ok(result) => result.map_err(DiscoveryError::from),
            Err(_) => Err(DiscoveryError::Timeout {
                addr: address,
                timeout_ms: self.config.discover_timeout_ms,
            }),
        }
    }
}

/// Resolve, store and announce a discovered device
pub fn register(
    registry: &mut DeviceRegistry,
    hooks: &mut Hooks,
    descriptors: NodeDescriptors,
    now_ms: u64,
) -> UpsertOutcome {
    let device = DiscoveredDevice::from_descriptors(descriptors, now_ms);
    let address = device.short_addr;
    if device.is_partial() {
        info!(
            "Registered {} from partial descriptors: {}",
            address,
            device.discovery_errors.join("; ")
        );
    }

    let outcome = registry.upsert(device);
    if let Some(device) = registry.get(address) {
        match outcome {
            UpsertOutcome::Added => hooks.device_added(device),
            UpsertOutcome::Updated => hooks.device_updated(device),
        }
    }
    outcome
}
