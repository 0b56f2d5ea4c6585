//! Transaction representations as they move through the pool.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::Hash;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// Per-transaction submission metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionMeta {
    /// The transaction was obtained from a local client and should be
    /// published immediately after a successful check.
    pub local: bool,
    /// Discard the transaction after checks instead of scheduling it.
    pub discard: bool,
    /// The transaction is already in the scheduling queue and is being
    /// rechecked; a failing check removes it.
    pub recheck: bool,
}

/// A weight dimension consumed by a transaction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxWeight {
    /// Number of transactions (always 1 per transaction).
    Count,
    /// Size of the raw transaction in bytes.
    SizeBytes,
    /// Number of consensus messages the transaction may emit.
    ConsensusMessages,
    /// A runtime-defined weight.
    Custom(String),
}

impl TxWeight {
    /// Whether this is a runtime-defined weight.
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl std::fmt::Display for TxWeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::SizeBytes => write!(f, "size_bytes"),
            Self::ConsensusMessages => write!(f, "consensus_messages"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// The outcome of running a transaction through the runtime's checks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckTxResult {
    /// Failure reason; `None` means the check passed.
    pub error: Option<String>,
    /// Weights consumed by the transaction as reported by the runtime.
    pub weights: BTreeMap<TxWeight, u64>,
}

impl CheckTxResult {
    /// A passing result with no runtime-reported weights.
    pub fn success() -> Self {
        Self::default()
    }

    /// A failing result.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            weights: BTreeMap::new(),
        }
    }

    /// Whether the check passed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert a passing result into a checked transaction, filling in the
    /// implicit count and size weights.
    pub fn to_checked_transaction(&self, raw: Vec<u8>) -> CheckedTransaction {
        CheckedTransaction::new(raw, self.weights.clone())
    }
}

/// A transaction that passed checks, ready for scheduling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedTransaction {
    hash: Hash,
    raw: Vec<u8>,
    weights: BTreeMap<TxWeight, u64>,
}

impl CheckedTransaction {
    /// Create a checked transaction. The implicit `Count` and `SizeBytes`
    /// weights are always present.
    pub fn new(raw: Vec<u8>, mut weights: BTreeMap<TxWeight, u64>) -> Self {
        let hash = Hash::digest_bytes(&raw);
        weights.insert(TxWeight::Count, 1);
        weights.insert(TxWeight::SizeBytes, raw.len() as u64);
        Self { hash, raw, weights }
    }

    /// The transaction fingerprint.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The raw transaction bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The consumed weight in a dimension (0 when absent).
    pub fn weight(&self, w: &TxWeight) -> u64 {
        self.weights.get(w).copied().unwrap_or(0)
    }

    /// All weights.
    pub fn weights(&self) -> &BTreeMap<TxWeight, u64> {
        &self.weights
    }
}

/// A transaction awaiting its check, queued in the check queue.
pub struct PendingTx {
    /// Raw transaction bytes.
    pub raw: Vec<u8>,
    /// Transaction fingerprint.
    pub hash: Hash,
    /// Submission metadata.
    pub meta: TransactionMeta,
    notify: Mutex<Option<oneshot::Sender<CheckTxResult>>>,
}

impl PendingTx {
    /// Create a pending transaction.
    pub fn new(
        raw: Vec<u8>,
        meta: TransactionMeta,
        notify: Option<oneshot::Sender<CheckTxResult>>,
    ) -> Self {
        let hash = Hash::digest_bytes(&raw);
        Self {
            raw,
            hash,
            meta,
            notify: Mutex::new(notify),
        }
    }

    /// Fire the waiter with the check result and close the sink. Later
    /// calls are no-ops; results are delivered at most once.
    pub fn notify(&self, result: CheckTxResult) {
        if let Some(tx) = self.notify.lock().take() {
            let _ = tx.send(result);
        }
    }
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx")
            .field("hash", &self.hash)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_weights() {
        let tx = CheckedTransaction::new(vec![1, 2, 3], BTreeMap::new());
        assert_eq!(tx.weight(&TxWeight::Count), 1);
        assert_eq!(tx.weight(&TxWeight::SizeBytes), 3);
        assert_eq!(tx.weight(&TxWeight::ConsensusMessages), 0);
    }

    #[test]
    fn test_runtime_weights_preserved() {
        let mut weights = BTreeMap::new();
        weights.insert(TxWeight::ConsensusMessages, 2);
        weights.insert(TxWeight::Custom("gas".into()), 40);
        let tx = CheckedTransaction::new(vec![0; 10], weights);
        assert_eq!(tx.weight(&TxWeight::ConsensusMessages), 2);
        assert_eq!(tx.weight(&TxWeight::Custom("gas".into())), 40);
    }

    #[test]
    fn test_fingerprint_is_content_hash() {
        let a = CheckedTransaction::new(vec![1], BTreeMap::new());
        let b = CheckedTransaction::new(vec![1], BTreeMap::new());
        let c = CheckedTransaction::new(vec![2], BTreeMap::new());
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[tokio::test]
    async fn test_notify_fires_once() {
        let (tx, rx) = oneshot::channel();
        let pending = PendingTx::new(vec![1], TransactionMeta::default(), Some(tx));
        pending.notify(CheckTxResult::success());
        pending.notify(CheckTxResult::failure("ignored"));
        assert!(rx.await.unwrap().is_success());
    }
}
