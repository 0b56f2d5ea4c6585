//! Weighted scheduling queue.
//!
//! Checked transactions wait here until a proposer pulls a batch. The
//! queue is deduplicated by fingerprint, keeps per-weight running totals,
//! and assembles batches as the largest queue prefix whose cumulative
//! weights stay within the per-round limits.
//!
//! The scheduling algorithm is named in the runtime descriptor; the
//! factory currently knows a single algorithm (`simple`, FIFO with weight
//! caps) but new algorithms plug in behind [`SchedulerAlgorithm`].

use super::errors::TxPoolError;
use super::transaction::{CheckedTransaction, TxWeight};
use shared_types::Hash;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Name of the FIFO-with-weight-caps algorithm.
pub const ALGORITHM_SIMPLE: &str = "simple";

/// A transaction scheduling algorithm.
pub trait SchedulerAlgorithm: Send {
    /// The algorithm's registered name.
    fn name(&self) -> &str;

    /// Queue a checked transaction.
    fn queue_tx(&mut self, tx: CheckedTransaction) -> Result<(), TxPoolError>;

    /// Remove transactions by fingerprint. Unknown fingerprints are
    /// silently skipped.
    fn remove_tx_batch(&mut self, hashes: &[Hash]);

    /// Assemble a batch for scheduling. With `force` unset, an underfull
    /// queue yields an empty batch; the flush timer forces underfull
    /// batches out. Queued transactions are not consumed.
    fn get_batch(&mut self, force: bool) -> Vec<CheckedTransaction>;

    /// Look up known transactions in input order; `None` marks a missing
    /// entry and the returned map gives each missing fingerprint's input
    /// index.
    fn get_known_batch(
        &self,
        hashes: &[Hash],
    ) -> (Vec<Option<CheckedTransaction>>, HashMap<Hash, usize>);

    /// All queued transactions in priority order, up to `limit`
    /// (0 = unlimited).
    fn get_transactions(&self, limit: usize) -> Vec<CheckedTransaction>;

    /// Drop all queued transactions.
    fn clear(&mut self);

    /// Number of queued transactions.
    fn unscheduled_size(&self) -> u64;

    /// Update the per-round weight limits. Changing the algorithm name is
    /// rejected.
    fn update_parameters(
        &mut self,
        algorithm: &str,
        weight_limits: &BTreeMap<TxWeight, u64>,
    ) -> Result<(), TxPoolError>;
}

/// Construct the scheduler named by the runtime descriptor.
pub fn new_scheduler(
    max_pool_size: u64,
    algorithm: &str,
    weight_limits: &BTreeMap<TxWeight, u64>,
) -> Result<Box<dyn SchedulerAlgorithm>, TxPoolError> {
    match algorithm {
        ALGORITHM_SIMPLE => Ok(Box::new(SimpleScheduler::new(
            max_pool_size,
            weight_limits.clone(),
        ))),
        other => Err(TxPoolError::UnknownAlgorithm(other.to_string())),
    }
}

/// FIFO scheduling with per-round weight caps.
pub struct SimpleScheduler {
    max_pool_size: u64,
    weight_limits: BTreeMap<TxWeight, u64>,
    order: VecDeque<Hash>,
    txs: HashMap<Hash, CheckedTransaction>,
    running_totals: BTreeMap<TxWeight, u64>,
}

impl SimpleScheduler {
    fn new(max_pool_size: u64, weight_limits: BTreeMap<TxWeight, u64>) -> Self {
        Self {
            max_pool_size,
            weight_limits,
            order: VecDeque::new(),
            txs: HashMap::new(),
            running_totals: BTreeMap::new(),
        }
    }

    fn add_totals(&mut self, tx: &CheckedTransaction) {
        for (w, v) in tx.weights() {
            *self.running_totals.entry(w.clone()).or_insert(0) += v;
        }
    }

    fn sub_totals(&mut self, tx: &CheckedTransaction) {
        for (w, v) in tx.weights() {
            if let Some(total) = self.running_totals.get_mut(w) {
                *total = total.saturating_sub(*v);
            }
        }
    }
}

impl SchedulerAlgorithm for SimpleScheduler {
    fn name(&self) -> &str {
        ALGORITHM_SIMPLE
    }

    fn queue_tx(&mut self, tx: CheckedTransaction) -> Result<(), TxPoolError> {
        if self.txs.contains_key(&tx.hash()) {
            return Err(TxPoolError::Duplicate(tx.hash()));
        }
        // A transaction exceeding a per-round limit on its own can never be
        // scheduled; reject it outright.
        for (w, limit) in &self.weight_limits {
            if tx.weight(w) > *limit {
                return Err(TxPoolError::ExceedsLimit {
                    weight: w.to_string(),
                });
            }
        }
        if self.order.len() as u64 >= self.max_pool_size {
            return Err(TxPoolError::QueueFull);
        }
        self.add_totals(&tx);
        self.order.push_back(tx.hash());
        self.txs.insert(tx.hash(), tx);
        Ok(())
    }

    fn remove_tx_batch(&mut self, hashes: &[Hash]) {
        for hash in hashes {
            if let Some(tx) = self.txs.remove(hash) {
                self.sub_totals(&tx);
                self.order.retain(|h| h != hash);
            }
        }
    }

    fn get_batch(&mut self, force: bool) -> Vec<CheckedTransaction> {
        // Below the minimum batch threshold only a flush produces a batch.
        let min_batch = self
            .weight_limits
            .get(&TxWeight::Count)
            .copied()
            .unwrap_or(0);
        if !force && (self.order.len() as u64) < min_batch {
            return Vec::new();
        }

        let mut batch = Vec::new();
        let mut batch_totals: BTreeMap<TxWeight, u64> = BTreeMap::new();
        'next_tx: for hash in &self.order {
            let tx = &self.txs[hash];
            for (w, limit) in &self.weight_limits {
                let total = batch_totals.get(w).copied().unwrap_or(0);
                if total + tx.weight(w) > *limit {
                    break 'next_tx;
                }
            }
            for (w, v) in tx.weights() {
                *batch_totals.entry(w.clone()).or_insert(0) += v;
            }
            batch.push(tx.clone());
        }
        batch
    }

    fn get_known_batch(
        &self,
        hashes: &[Hash],
    ) -> (Vec<Option<CheckedTransaction>>, HashMap<Hash, usize>) {
        let mut result = Vec::with_capacity(hashes.len());
        let mut missing = HashMap::new();
        for (idx, hash) in hashes.iter().enumerate() {
            match self.txs.get(hash) {
                Some(tx) => result.push(Some(tx.clone())),
                None => {
                    result.push(None);
                    missing.insert(*hash, idx);
                }
            }
        }
        (result, missing)
    }

    fn get_transactions(&self, limit: usize) -> Vec<CheckedTransaction> {
        let take = if limit == 0 { self.order.len() } else { limit };
        self.order
            .iter()
            .take(take)
            .map(|h| self.txs[h].clone())
            .collect()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.txs.clear();
        self.running_totals.clear();
    }

    fn unscheduled_size(&self) -> u64 {
        self.order.len() as u64
    }

    fn update_parameters(
        &mut self,
        algorithm: &str,
        weight_limits: &BTreeMap<TxWeight, u64>,
    ) -> Result<(), TxPoolError> {
        if algorithm != ALGORITHM_SIMPLE {
            return Err(TxPoolError::AlgorithmMismatch {
                current: ALGORITHM_SIMPLE.to_string(),
                requested: algorithm.to_string(),
            });
        }
        self.weight_limits = weight_limits.clone();
        Ok(())
    }
}
