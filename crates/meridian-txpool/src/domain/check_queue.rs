//! Pending-check queue.
//!
//! A bounded FIFO of transactions waiting to be checked by the runtime.
//! Batches are handed out while staying queued: a failed runtime call
//! retries the same batch, and only a completed check removes it.

use super::errors::TxPoolError;
use super::transaction::PendingTx;
use parking_lot::Mutex;
use shared_types::Hash;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Bounded FIFO of transactions pending checks.
///
/// Internally locked; deduplicates by fingerprint. An `add` for a known
/// fingerprint fails with `Duplicate` and does not touch the existing
/// entry's notify sink.
pub struct CheckQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    max_batch: usize,
}

struct Inner {
    queue: VecDeque<Arc<PendingTx>>,
    known: HashSet<Hash>,
}

impl CheckQueue {
    /// Create a queue bounded to `capacity` entries handing out batches of
    /// up to `max_batch`.
    pub fn new(capacity: u64, max_batch: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                known: HashSet::new(),
            }),
            capacity: capacity as usize,
            max_batch: max_batch.max(1) as usize,
        }
    }

    /// Enqueue a transaction for checking.
    pub fn add(&self, tx: Arc<PendingTx>) -> Result<(), TxPoolError> {
        let mut inner = self.inner.lock();
        if inner.queue.len() >= self.capacity {
            return Err(TxPoolError::QueueFull);
        }
        if !inner.known.insert(tx.hash) {
            return Err(TxPoolError::Duplicate(tx.hash));
        }
        inner.queue.push_back(tx);
        Ok(())
    }

    /// The next batch in insertion order, up to the batch limit. Items
    /// remain queued until removed.
    pub fn get_batch(&self) -> Vec<Arc<PendingTx>> {
        let inner = self.inner.lock();
        inner
            .queue
            .iter()
            .take(self.max_batch)
            .cloned()
            .collect()
    }

    /// Remove a previously handed-out batch.
    pub fn remove_batch(&self, batch: &[Arc<PendingTx>]) {
        let mut inner = self.inner.lock();
        let removing: HashSet<Hash> = batch.iter().map(|tx| tx.hash).collect();
        inner.queue.retain(|tx| !removing.contains(&tx.hash));
        for hash in &removing {
            inner.known.remove(hash);
        }
    }

    /// Number of queued transactions.
    pub fn size(&self) -> u64 {
        self.inner.lock().queue.len() as u64
    }
}
