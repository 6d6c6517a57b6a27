//! Pipeline health counters
//!
//! Internal counters in the spirit of a dropped-log gauge: cheap atomics,
//! readable at any time, reset on shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Entries delivered to at least one transport
    dispatched: AtomicU64,

    /// Entries dropped by the min-level filter
    level_filtered: AtomicU64,

    /// Entries dropped by the sampler
    sampled_out: AtomicU64,

    /// Entries folded away by deduplication
    deduplicated: AtomicU64,

    /// Individual transport log/flush failures (isolated, not propagated)
    transport_failures: AtomicU64,
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            level_filtered: AtomicU64::new(0),
            sampled_out: AtomicU64::new(0),
            deduplicated: AtomicU64::new(0),
            transport_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn level_filtered(&self) -> u64 {
        self.level_filtered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sampled_out(&self) -> u64 {
        self.sampled_out.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn deduplicated(&self) -> u64 {
        self.deduplicated.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn transport_failures(&self) -> u64 {
        self.transport_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_level_filtered(&self) {
        self.level_filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sampled_out(&self) {
        self.sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.dispatched.store(0, Ordering::Relaxed);
        self.level_filtered.store(0, Ordering::Relaxed);
        self.sampled_out.store(0, Ordering::Relaxed);
        self.deduplicated.store(0, Ordering::Relaxed);
        self.transport_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_dispatched();
        metrics.record_dispatched();
        metrics.record_sampled_out();
        metrics.record_transport_failure();

        assert_eq!(metrics.dispatched(), 2);
        assert_eq!(metrics.sampled_out(), 1);
        assert_eq!(metrics.transport_failures(), 1);
        assert_eq!(metrics.level_filtered(), 0);

        metrics.reset();
        assert_eq!(metrics.dispatched(), 0);
    }
}
