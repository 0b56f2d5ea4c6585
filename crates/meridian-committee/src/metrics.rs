//! Metrics collection for the committee node.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the committee node.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Batches processed to a published commitment.
    pub batches_proposed: AtomicU64,
    /// Batches aborted before a commitment was published.
    pub batches_aborted: AtomicU64,
    /// Compute discrepancies observed.
    pub discrepancies_detected: AtomicU64,
    /// Total time spent from batch start to finalization, in milliseconds.
    pub batch_processing_ms: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proposed batch.
    pub fn record_proposed(&self) {
        self.batches_proposed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an aborted batch.
    pub fn record_aborted(&self) {
        self.batches_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an observed discrepancy.
    pub fn record_discrepancy(&self) {
        self.discrepancies_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record end-to-end processing time for a finalized batch.
    pub fn record_processing_time(&self, ms: u64) {
        self.batch_processing_ms.fetch_add(ms, Ordering::Relaxed);
    }
}
