//! Process-local job counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_dispatched: AtomicU64,
    jobs_failed: AtomicU64,
    encode_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_dispatched", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn encode_failed(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "encode_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_dispatched: u64,
    pub jobs_failed: u64,
    pub encode_failures: u64,
}
