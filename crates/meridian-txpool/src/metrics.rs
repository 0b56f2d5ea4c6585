//! Metrics collection for the transaction pool.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the transaction pool.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Transactions currently pending checks.
    pub pending_check_size: AtomicU64,
    /// Transactions currently pending scheduling.
    pub pending_schedule_size: AtomicU64,
    /// Total transactions that passed checks.
    pub checked_total: AtomicU64,
    /// Total transactions that failed checks.
    pub check_failed_total: AtomicU64,
    /// Total transactions republished to the network.
    pub republished_total: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pending-check gauge.
    pub fn set_pending_check(&self, n: u64) {
        self.pending_check_size.store(n, Ordering::Relaxed);
    }

    /// Record the pending-schedule gauge.
    pub fn set_pending_schedule(&self, n: u64) {
        self.pending_schedule_size.store(n, Ordering::Relaxed);
    }

    /// Record check outcomes for a batch.
    pub fn record_checked(&self, passed: u64, failed: u64) {
        self.checked_total.fetch_add(passed, Ordering::Relaxed);
        self.check_failed_total.fetch_add(failed, Ordering::Relaxed);
    }

    /// Record republished transactions.
    pub fn record_republished(&self, n: u64) {
        self.republished_total.fetch_add(n, Ordering::Relaxed);
    }
}
