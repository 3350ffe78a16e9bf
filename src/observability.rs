//! Process-wide upload counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_interrupted: AtomicU64,
    jobs_resumed: AtomicU64,
    units_committed: AtomicU64,
    pages_stored: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64, name: &'static str, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
        tracing::debug!(counter = name, by, "Metric incremented");
    }

    pub fn job_submitted(&self) {
        Self::bump(&self.jobs_submitted, "jobs_submitted", 1);
    }

    pub fn job_completed(&self) {
        Self::bump(&self.jobs_completed, "jobs_completed", 1);
    }

    pub fn job_failed(&self) {
        Self::bump(&self.jobs_failed, "jobs_failed", 1);
    }

    pub fn job_interrupted(&self) {
        Self::bump(&self.jobs_interrupted, "jobs_interrupted", 1);
    }

    pub fn job_resumed(&self) {
        Self::bump(&self.jobs_resumed, "jobs_resumed", 1);
    }

    pub fn unit_committed(&self, pages: u64) {
        Self::bump(&self.units_committed, "units_committed", 1);
        if pages > 0 {
            Self::bump(&self.pages_stored, "pages_stored", pages);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_interrupted: self.jobs_interrupted.load(Ordering::Relaxed),
            jobs_resumed: self.jobs_resumed.load(Ordering::Relaxed),
            units_committed: self.units_committed.load(Ordering::Relaxed),
            pages_stored: self.pages_stored.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_interrupted: u64,
    pub jobs_resumed: u64,
    pub units_committed: u64,
    pub pages_stored: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.job_submitted();
        metrics.unit_committed(7);
        metrics.unit_committed(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 1);
        assert_eq!(snapshot.units_committed, 2);
        assert_eq!(snapshot.pages_stored, 7);
    }
}
