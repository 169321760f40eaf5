//! meshcoord Discovery Scheduler
//!
//! Owns the queue of addresses awaiting descriptor discovery. Join bursts
//! are debounced, failed attempts are retried with capped exponential
//! backoff, and successful results flow through capability resolution into
//! the device registry.
//!
//! The scheduler never runs on its own: the driving loop calls
//! [`DiscoveryScheduler::process`] with a bounded batch size.

pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod stats;

pub use backoff::RetryPolicy;
pub use config::DiscoveryConfig;
pub use error::{DiscoveryError, Result};
pub use events::{AttemptOutcome, AttemptTarget, CommissioningEvent, HealAction, HealReason, Hooks};
pub use scheduler::{register, DiscoveryScheduler, PendingDiscoveryEntry};
pub use stats::{DiscoveryStats, ProcessReport};
