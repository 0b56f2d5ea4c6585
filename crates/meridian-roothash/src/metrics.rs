//! Metrics collection for the round state machine.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the round state machine.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total blocks finalized across all runtimes.
    pub blocks_finalized: AtomicU64,
    /// Total rounds that failed.
    pub rounds_failed: AtomicU64,
    /// Total discrepancies detected.
    pub discrepancies_detected: AtomicU64,
    /// Total equivocation slashes executed.
    pub evidence_slashes: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finalized block.
    pub fn record_block(&self) {
        self.blocks_finalized.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed round.
    pub fn record_round_failed(&self) {
        self.rounds_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a detected discrepancy.
    pub fn record_discrepancy(&self) {
        self.discrepancies_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an executed slash.
    pub fn record_slash(&self) {
        self.evidence_slashes.fetch_add(1, Ordering::Relaxed);
    }
}
