//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event, e.g. when a worker pool drains.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. No allocations, no locking.
pub struct Metrics {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,
    degraded_runs: AtomicU64,
    detections: AtomicU64,
    flagged_detections: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_cancelled: AtomicU64::new(0),
            degraded_runs: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            flagged_detections: AtomicU64::new(0),
        }
    }

    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_completed", "counter incremented");
    }

    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_failed", "counter incremented");
    }

    pub fn inc_jobs_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_cancelled", "counter incremented");
    }

    /// A run that used the difference fallback.
    pub fn inc_degraded_runs(&self) {
        self.degraded_runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "degraded_runs", "counter incremented");
    }

    /// Add a job's detection and flagged counts.
    pub fn add_detections(&self, total: u64, flagged: u64) {
        self.detections.fetch_add(total, Ordering::Relaxed);
        self.flagged_detections.fetch_add(flagged, Ordering::Relaxed);
        tracing::trace!(metric = "detections", total, flagged, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            jobs_completed = self.jobs_completed(),
            jobs_failed = self.jobs_failed(),
            jobs_cancelled = self.jobs_cancelled(),
            degraded_runs = self.degraded_runs(),
            detections = self.detections(),
            flagged_detections = self.flagged_detections(),
        );
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn jobs_cancelled(&self) -> u64 {
        self.jobs_cancelled.load(Ordering::Relaxed)
    }

    pub fn degraded_runs(&self) -> u64 {
        self.degraded_runs.load(Ordering::Relaxed)
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn flagged_detections(&self) -> u64 {
        self.flagged_detections.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.jobs_completed.store(0, Ordering::Relaxed);
        self.jobs_failed.store(0, Ordering::Relaxed);
        self.jobs_cancelled.store(0, Ordering::Relaxed);
        self.degraded_runs.store(0, Ordering::Relaxed);
        self.detections.store(0, Ordering::Relaxed);
        self.flagged_detections.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_jobs_completed();
        m.inc_jobs_completed();
        m.inc_jobs_failed();
        m.inc_degraded_runs();
        m.add_detections(7, 2);
        m.add_detections(1, 0);
        assert_eq!(m.jobs_completed(), 2);
        assert_eq!(m.jobs_failed(), 1);
        assert_eq!(m.jobs_cancelled(), 0);
        assert_eq!(m.degraded_runs(), 1);
        assert_eq!(m.detections(), 8);
        assert_eq!(m.flagged_detections(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_jobs_cancelled();
        m.add_detections(3, 3);
        m.reset();
        assert_eq!(m.jobs_cancelled(), 0);
        assert_eq!(m.detections(), 0);
        assert_eq!(m.flagged_detections(), 0);
    }
}
