//! Network self-heal
//!
//! Network-health faults arm a bounded retry run. A run repeats one
//! recovery action (reform or rejoin) with the same capped backoff that
//! discovery uses, one attempt per [`SelfHealController::poll`]. Every
//! stack call is bounded by `command_timeout_ms`; a timeout is a failed
//! attempt.

use meshcoord_discovery::{
    AttemptOutcome, AttemptTarget, CommissioningEvent, HealAction, HealReason, Hooks,
};
use meshcoord_stack::{RadioStack, StackError, StackFeatures};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use crate::config::SelfHealConfig;

const EVENT_LOG_CAPACITY: usize = 100;

/// Self-heal counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelfHealStats {
    pub panid_conflicts: u64,
    pub steering_failures: u64,
    /// Runs armed
    pub triggered: u64,
    /// Triggers absorbed by a run already in flight
    pub coalesced: u64,
    pub attempts: u64,
    pub success: u64,
    pub failed: u64,
    /// Runs that ended without recovering
    pub exhausted: u64,
    pub last_reason: Option<HealReason>,
    pub last_error: Option<String>,
}

/// An armed recovery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealRun {
    pub reason: HealReason,
    pub action: HealAction,
    /// Failed attempts so far
    pub attempts: u32,
    pub next_try_ms: u64,
    pub started_ms: u64,
}

/// Bounded, backed-off network recovery
#[derive(Debug)]
pub struct SelfHealController {
    config: SelfHealConfig,
    network_started: bool,
    run: Option<HealRun>,
    stats: SelfHealStats,
    event_log: VecDeque<AttemptOutcome>,
}

impl SelfHealController {
    pub fn new(config: SelfHealConfig) -> Self {
        Self {
            config,
            network_started: false,
            run: None,
            stats: SelfHealStats::default(),
            event_log: VecDeque::new(),
        }
    }

    /// Healing only makes sense once the network has been started
    pub fn set_network_started(&mut self, started: bool) {
        self.network_started = started;
    }

    pub fn stats(&self) -> &SelfHealStats {
        &self.stats
    }

    pub fn active_run(&self) -> Option<&HealRun> {
        self.run.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.run.is_some()
    }

    /// Most recent attempt outcomes, oldest first
    pub fn recent_attempts(&self) -> impl Iterator<Item = &AttemptOutcome> {
        self.event_log.iter()
    }

    /// Arm a recovery run; false if disabled, not started, or already running
    pub fn trigger(&mut self, reason: HealReason, action: HealAction, now_ms: u64) -> bool {
        match reason {
            HealReason::PanIdConflict => self.stats.panid_conflicts += 1,
            HealReason::SteeringFailure => self.stats.steering_failures += 1,
        }
        self.stats.last_reason = Some(reason);

        if !self.config.enabled {
            debug!("Self-heal disabled, ignoring {}", reason);
            return false;
        }
        if !self.network_started {
            debug!("Network not started, ignoring {}", reason);
            return false;
        }
        if let Some(run) = &self.run {
            self.stats.coalesced += 1;
            debug!(
                "Self-heal already running ({} / {}), coalesced {}",
                run.reason, run.action, reason
            );
            return false;
        }

        info!("Self-heal armed: {} -> {}", reason, action);
        self.run = Some(HealRun {
            reason,
            action,
            attempts: 0,
            next_try_ms: now_ms,
            started_ms: now_ms,
        });
        self.stats.triggered += 1;
        true
    }

    /// Abandon the current run without counting it as exhausted
    pub fn cancel(&mut self) -> Option<HealRun> {
        self.run.take()
    }

    /// Run at most one due attempt
    pub async fn poll(
        &mut self,
        stack: &dyn RadioStack,
        hooks: &mut Hooks,
        now_ms: u64,
    ) -> Option<AttemptOutcome> {
        let run = self.run.clone()?;
        if run.next_try_ms > now_ms {
            return None;
        }

        let policy = self.config.retry;
        let attempt = run.attempts + 1;
        self.stats.attempts += 1;
        debug!(
            "Self-heal attempt {}/{}: {}",
            attempt, policy.max_attempts, run.action
        );

        let result = self.perform(stack, run.action).await;

        let outcome = match result {
            Ok(()) => {
                self.run = None;
                self.stats.success += 1;
                self.stats.last_error = None;
                info!(
                    "Self-heal recovered from {} after {} attempt(s)",
                    run.reason, attempt
                );
                self.reopen_join(stack).await;

                AttemptOutcome {
                    target: AttemptTarget::SelfHeal {
                        reason: run.reason,
                        action: run.action,
                    },
                    attempt,
                    max_attempts: policy.max_attempts,
                    success: true,
                    error: None,
                    next_try_ms: None,
                    exhausted: false,
                    at_ms: now_ms,
                }
            }
            Err(err) => {
                self.stats.failed += 1;
                self.stats.last_error = Some(err.to_string());

                let next_try_ms = if policy.can_retry(run.attempts) {
                    let backoff = policy.delay_for(run.attempts);
                    let next = now_ms.saturating_add(backoff);
                    self.run = Some(HealRun {
                        attempts: attempt,
                        next_try_ms: next,
                        ..run
                    });
                    debug!("Self-heal attempt failed ({}), retry in {} ms", err, backoff);
                    Some(next)
                } else {
                    self.run = None;
                    self.stats.exhausted += 1;
                    warn!(
                        "Self-heal for {} exhausted after {} attempt(s), network degraded: {}",
                        run.reason, attempt, err
                    );
                    None
                };

                AttemptOutcome {
                    target: AttemptTarget::SelfHeal {
                        reason: run.reason,
                        action: run.action,
                    },
                    attempt,
                    max_attempts: policy.max_attempts,
                    success: false,
                    error: Some(err.to_string()),
                    next_try_ms,
                    exhausted: next_try_ms.is_none(),
                    at_ms: now_ms,
                }
            }
        };

        if self.event_log.len() >= EVENT_LOG_CAPACITY {
            self.event_log.pop_front();
        }
        self.event_log.push_back(outcome.clone());
        hooks.emit(CommissioningEvent::Attempt(outcome.clone()));
        Some(outcome)
    }

    async fn perform(&self, stack: &dyn RadioStack, action: HealAction) -> Result<(), StackError> {
        match action {
            HealAction::Reform => self.bounded("network start", stack.start(true)).await,
            HealAction::Rejoin => {
                if stack.capabilities().supports(StackFeatures::NETWORK_STEERING) {
                    self.bounded("network steering", stack.start_network_steering())
                        .await
                } else {
                    self.bounded("network start", stack.start(false)).await
                }
            }
        }
    }

    async fn reopen_join(&self, stack: &dyn RadioStack) {
        if self.config.reopen_join_s == 0 {
            return;
        }
        let reopen = stack.permit_join(self.config.reopen_join_s);
        if let Err(e) = self.bounded("permit join", reopen).await {
            warn!("Failed to reopen joining after self-heal: {}", e);
        }
    }

    async fn bounded<F>(&self, operation: &'static str, call: F) -> Result<(), StackError>
    where
        F: Future<Output = Result<(), StackError>>,
    {
        let timeout_ms = self.config.command_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(result) => result,
            Err(_) => Err(StackError::Timeout {
                operation,
                timeout_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcoord_discovery::RetryPolicy;
    use meshcoord_stack::{SimulatedStack, StackCapabilities};

    fn controller(max_attempts: u32) -> SelfHealController {
        let mut ctl = SelfHealController::new(SelfHealConfig {
            enabled: true,
            retry: RetryPolicy::new(max_attempts, 100, 1_000),
            reopen_join_s: 30,
            command_timeout_ms: 500,
        });
        ctl.set_network_started(true);
        ctl
    }

    #[test]
    fn test_trigger_gates() {
        let mut disabled = SelfHealController::new(SelfHealConfig {
            enabled: false,
            ..Default::default()
        });
        disabled.set_network_started(true);
        assert!(!disabled.trigger(HealReason::PanIdConflict, HealAction::Reform, 0));
        assert_eq!(disabled.stats().panid_conflicts, 1);

        let mut not_started = SelfHealController::new(SelfHealConfig::default());
        assert!(!not_started.trigger(HealReason::PanIdConflict, HealAction::Reform, 0));
        assert!(!not_started.is_in_flight());
    }

    #[test]
    fn test_duplicate_triggers_coalesce() {
        let mut ctl = controller(2);
        assert!(ctl.trigger(HealReason::PanIdConflict, HealAction::Reform, 0));
        assert!(!ctl.trigger(HealReason::PanIdConflict, HealAction::Reform, 5));
        assert!(!ctl.trigger(HealReason::SteeringFailure, HealAction::Rejoin, 6));

        let stats = ctl.stats();
        assert_eq!(stats.triggered, 1);
        assert_eq!(stats.coalesced, 2);
        assert_eq!(ctl.active_run().map(|r| r.action), Some(HealAction::Reform));
    }

    #[tokio::test]
    async fn test_reform_success_reopens_join() {
        let stack = SimulatedStack::default();
        stack.start(true).await.unwrap();
        let mut hooks = Hooks::new();
        let mut ctl = controller(2);

        ctl.trigger(HealReason::PanIdConflict, HealAction::Reform, 0);
        let outcome = ctl.poll(&stack, &mut hooks, 0).await.unwrap();

        assert!(outcome.success);
        assert!(!ctl.is_in_flight());
        assert_eq!(stack.start_calls(), vec![true, true]);
        assert_eq!(stack.permit_join_calls(), vec![30]);
        assert_eq!(ctl.stats().success, 1);
    }

    #[tokio::test]
    async fn test_retry_with_backoff_then_exhaustion() {
        let stack = SimulatedStack::default();
        stack.fail_start(10);
        let mut hooks = Hooks::new();
        let mut ctl = controller(3);

        ctl.trigger(HealReason::PanIdConflict, HealAction::Reform, 1_000);

        let first = ctl.poll(&stack, &mut hooks, 1_000).await.unwrap();
        assert_eq!(first.next_try_ms, Some(1_100));
        assert!(ctl.poll(&stack, &mut hooks, 1_099).await.is_none());

        let second = ctl.poll(&stack, &mut hooks, 1_100).await.unwrap();
        assert_eq!(second.next_try_ms, Some(1_300));

        let third = ctl.poll(&stack, &mut hooks, 1_300).await.unwrap();
        assert!(third.exhausted);
        assert_eq!(third.attempt, 3);
        assert!(!ctl.is_in_flight());

        let stats = ctl.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(ctl.recent_attempts().count(), 3);

        // A new fault can arm a fresh run
        assert!(ctl.trigger(HealReason::PanIdConflict, HealAction::Reform, 2_000));
    }

    #[tokio::test]
    async fn test_rejoin_uses_steering_when_supported() {
        let stack = SimulatedStack::default();
        let mut hooks = Hooks::new();
        let mut ctl = controller(2);

        ctl.trigger(HealReason::SteeringFailure, HealAction::Rejoin, 0);
        ctl.poll(&stack, &mut hooks, 0).await.unwrap();
        assert_eq!(stack.steering_calls(), 1);
        assert!(stack.start_calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_falls_back_to_start() {
        let stack = SimulatedStack::new(StackCapabilities::minimal());
        let mut hooks = Hooks::new();
        let mut ctl = controller(2);

        ctl.trigger(HealReason::SteeringFailure, HealAction::Rejoin, 0);
        let outcome = ctl.poll(&stack, &mut hooks, 0).await.unwrap();
        assert!(outcome.success);
        assert_eq!(stack.steering_calls(), 0);
        assert_eq!(stack.start_calls(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_start_times_out_and_retries() {
        let stack = SimulatedStack::default();
        stack.set_command_delay(Some(Duration::from_secs(60)));
        let mut hooks = Hooks::new();
        let mut ctl = controller(2);

        ctl.trigger(HealReason::PanIdConflict, HealAction::Reform, 0);
        let first = ctl.poll(&stack, &mut hooks, 0).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.next_try_ms, Some(100));
        assert!(first.error.unwrap().contains("timed out after 500 ms"));
        assert!(ctl.is_in_flight());

        stack.set_command_delay(None);
        let second = ctl.poll(&stack, &mut hooks, 100).await.unwrap();
        assert!(second.success);
        assert_eq!(stack.start_calls(), vec![true]);
        assert_eq!(ctl.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_poll_without_run() {
        let stack = SimulatedStack::default();
        let mut hooks = Hooks::new();
        let mut ctl = controller(2);
        assert!(ctl.poll(&stack, &mut hooks, 0).await.is_none());
        assert_eq!(ctl.stats().attempts, 0);
    }
}
