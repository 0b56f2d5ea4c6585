//! Transaction pool error types.

use shared_types::Hash;
use thiserror::Error;

/// Errors surfaced by the transaction pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxPoolError {
    /// A queue is at capacity; the caller may retry later.
    #[error("queue full")]
    QueueFull,

    /// The transaction is already known.
    #[error("duplicate transaction: {0}")]
    Duplicate(Hash),

    /// A single transaction exceeds a per-round weight limit and can never
    /// be scheduled.
    #[error("transaction exceeds per-round limit for weight {weight}")]
    ExceedsLimit {
        /// The violated weight dimension.
        weight: String,
    },

    /// No runtime block has been observed yet.
    #[error("no current block available")]
    NoCurrentBlock,

    /// The scheduling algorithm named by the descriptor is not known.
    #[error("unknown scheduler algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The descriptor attempted to change the scheduling algorithm at
    /// runtime; a restart is required.
    #[error("scheduler algorithm update not supported: {current} -> {requested}")]
    AlgorithmMismatch {
        /// Currently active algorithm.
        current: String,
        /// Algorithm requested by the descriptor.
        requested: String,
    },

    /// The runtime host failed to check a batch.
    #[error("runtime check failed: {0}")]
    CheckFailed(String),

    /// The transport failed to publish a transaction.
    #[error("transaction publish failed: {0}")]
    PublishFailed(String),

    /// The pool is stopping; terminal for all waiters.
    #[error("shutting down")]
    ShuttingDown,
}

impl TxPoolError {
    /// Whether the caller may reasonably retry the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull | Self::NoCurrentBlock | Self::CheckFailed(_) | Self::PublishFailed(_)
        )
    }
}
