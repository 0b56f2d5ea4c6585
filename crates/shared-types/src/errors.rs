//! # Error Types
//!
//! Errors surfaced by header, receipt and commitment verification.

use thiserror::Error;

/// Errors from storage receipt verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReceiptError {
    /// Receipt body version is not supported.
    #[error("receipt has invalid version: {0}")]
    InvalidVersion(u16),

    /// Receipt namespace does not match the header.
    #[error("receipt has unexpected namespace")]
    UnexpectedNamespace,

    /// Receipt round does not match the header.
    #[error("receipt has unexpected round: expected {expected}, got {actual}")]
    UnexpectedRound {
        /// Round the header binds.
        expected: u64,
        /// Round carried by the receipt.
        actual: u64,
    },

    /// Receipt carries the wrong number of roots or root types.
    #[error("receipt has unexpected number of roots")]
    RootCountMismatch,

    /// A root type differs from the header's sequence.
    #[error("receipt has unexpected root types")]
    RootTypeMismatch,

    /// A root differs from the header's roots.
    #[error("receipt has unexpected roots")]
    RootMismatch,

    /// The receipt multi-signature did not verify.
    #[error("receipt signature verification failed")]
    VerifyFailed,
}

/// Errors from commitment envelope verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitmentError {
    /// The commitment signature did not verify.
    #[error("commitment signature verification failed")]
    VerifyFailed,

    /// The embedded transaction scheduler signature did not verify.
    #[error("proposed batch signature verification failed")]
    SchedulerSignatureInvalid,
}
