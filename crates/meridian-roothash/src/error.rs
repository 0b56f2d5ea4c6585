//! Roothash error types.

use shared_types::Namespace;
use thiserror::Error;

/// Errors surfaced by the round state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoothashError {
    /// The runtime is not registered.
    #[error("no such runtime: {0}")]
    NoSuchRuntime(Namespace),

    /// The runtime is already registered.
    #[error("runtime already registered: {0}")]
    AlreadyRegistered(Namespace),

    /// A signature check failed.
    #[error("signature verification failed")]
    VerifyFailed,

    /// The committer is not an eligible committee member for the round's
    /// current phase.
    #[error("not an eligible committee member")]
    NotCommitteeMember,

    /// The node already committed for this round.
    #[error("node already committed for this round")]
    AlreadyCommitted,

    /// The commitment is not based on the runtime's current block.
    #[error("commitment not based on current block: expected round {expected}, got {got}")]
    NotBasedOnCurrentBlock {
        /// Round commitments must target.
        expected: u64,
        /// Round the commitment targeted.
        got: u64,
    },

    /// The commitment's embedded scheduler signature is not from the
    /// round's designated transaction scheduler, or does not verify.
    #[error("invalid transaction scheduler signature")]
    InvalidSchedulerSignature,

    /// The storage receipt signatures on the commitment do not verify.
    #[error("invalid storage receipt signatures")]
    StorageReceiptInvalid,

    /// A proposer timeout request was rejected.
    #[error("proposer timeout not allowed: {0}")]
    ProposerTimeoutNotAllowed(&'static str),

    /// Submitted evidence is malformed or not slashable.
    #[error("invalid evidence: {0}")]
    InvalidEvidence(&'static str),

    /// The staking module rejected the slash.
    #[error("staking error: {0}")]
    StakingError(String),
}
