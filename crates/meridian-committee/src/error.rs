//! Committee node error types.

use shared_types::ReceiptError;
use thiserror::Error;

/// Errors surfaced by the committee node controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitteeError {
    /// A newer block arrived while a batch was being processed; any
    /// in-flight state is invalid.
    #[error("seen newer block while processing batch")]
    SeenNewerBlock,

    /// The runtime worker aborted batch processing.
    #[error("worker aborted batch processing")]
    WorkerAborted,

    /// A received batch references a header this node cannot process.
    #[error("incompatible header in external batch")]
    IncompatibleHeader,

    /// The node is not in a role that may receive this input.
    #[error("incorrect role")]
    IncorrectRole,

    /// The node is not in a state that may accept this input.
    #[error("incorrect state")]
    IncorrectState,

    /// The storage commit did not complete within the configured timeout.
    #[error("storage commit timed out")]
    StorageCommitTimeout,

    /// The storage backend rejected the apply.
    #[error("storage apply failed: {0}")]
    StorageFailed(String),

    /// The storage receipt does not match the computed results.
    #[error("storage receipt invalid: {0}")]
    StorageReceiptInvalid(#[from] ReceiptError),

    /// Publishing the commitment failed.
    #[error("commitment publish failed: {0}")]
    PublishFailed(String),

    /// The runtime host failed to execute the batch.
    #[error("runtime execution failed: {0}")]
    ExecutionFailed(String),
}
