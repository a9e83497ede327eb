//! Transition counters for the activity engine

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters updated by the engine as transitions commit
#[derive(Debug, Default)]
pub struct EngineMetrics {
    scheduled: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    paused: AtomicU64,
    unpaused: AtomicU64,
    reset: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    rolled_back: AtomicU64,
    conflicts: AtomicU64,
    effect_failures: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetricsSnapshot {
    pub scheduled: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub paused: u64,
    pub unpaused: u64,
    pub reset: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    /// Units of work whose effects were discarded
    pub rolled_back: u64,
    /// Saves that lost the version race
    pub conflicts: u64,
    /// Effect callbacks that returned an error or panicked
    pub effect_failures: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_paused(&self) {
        self.paused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unpaused(&self) {
        self.unpaused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reset(&self) {
        self.reset.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_effect_failures(&self, n: usize) {
        self.effect_failures.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            paused: self.paused.load(Ordering::Relaxed),
            unpaused: self.unpaused.load(Ordering::Relaxed),
            reset: self.reset.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            effect_failures: self.effect_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = EngineMetrics::new();
        metrics.record_scheduled();
        metrics.record_scheduled();
        metrics.record_conflict();
        metrics.record_effect_failures(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scheduled, 2);
        assert_eq!(snapshot.conflicts, 1);
        assert_eq!(snapshot.effect_failures, 3);
        assert_eq!(snapshot.completed, 0);
    }
}
