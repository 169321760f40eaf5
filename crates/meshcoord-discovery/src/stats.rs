//! Discovery counters

use serde::Serialize;

/// Monotonic discovery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryStats {
    /// New addresses accepted into the queue
    pub enqueued: u64,
    /// Enqueues rejected inside the debounce window
    pub debounced: u64,
    /// Existing entries reset by an enqueue outside the window
    pub refreshed: u64,
    /// Entries dropped to make room in a full queue
    pub overflow_dropped: u64,
    pub attempts: u64,
    pub success: u64,
    pub failed: u64,
    /// Failures that were rescheduled
    pub requeued: u64,
    /// Entries dropped after exhausting retries
    pub abandoned: u64,
    pub timeouts: u64,
}

/// Result of one `process` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    /// Entries still pending afterwards
    pub queue_depth: usize,
}
