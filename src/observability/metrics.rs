//! Planner metrics
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics: a registry may be shared by planners on several
//!   threads

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of planner outcomes and decisions
#[derive(Debug, Default)]
pub struct PlannerMetrics {
    plans_compiled: AtomicU64,
    plans_rejected: AtomicU64,
    /// Explicit sorts added to single-node, partition or coordinator
    /// fragments
    sorts_added: AtomicU64,
    merge_receives: AtomicU64,
    /// Ordered multi-partition queries that had to buffer and sort
    merge_fallbacks: AtomicU64,
    index_scans: AtomicU64,
    seq_scans: AtomicU64,
}

impl PlannerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_plans_compiled(&self) {
        self.plans_compiled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plans_rejected(&self) {
        self.plans_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sorts_added(&self) {
        self.sorts_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_merge_receives(&self) {
        self.merge_receives.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_merge_fallbacks(&self) {
        self.merge_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_index_scans(&self) {
        self.index_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_seq_scans(&self) {
        self.seq_scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as one JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"plans_compiled":{},"plans_rejected":{},"sorts_added":{},"merge_receives":{},"merge_fallbacks":{},"index_scans":{},"seq_scans":{}}}"#,
            s.plans_compiled, s.plans_rejected, s.sorts_added, s.merge_receives, s.merge_fallbacks, s.index_scans, s.seq_scans,
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_compiled: self.plans_compiled.load(Ordering::Relaxed),
            plans_rejected: self.plans_rejected.load(Ordering::Relaxed),
            sorts_added: self.sorts_added.load(Ordering::Relaxed),
            merge_receives: self.merge_receives.load(Ordering::Relaxed),
            merge_fallbacks: self.merge_fallbacks.load(Ordering::Relaxed),
            index_scans: self.index_scans.load(Ordering::Relaxed),
            seq_scans: self.seq_scans.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub plans_compiled: u64,
    pub plans_rejected: u64,
    pub sorts_added: u64,
    pub merge_receives: u64,
    pub merge_fallbacks: u64,
    pub index_scans: u64,
    pub seq_scans: u64,
}
