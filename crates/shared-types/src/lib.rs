//! # Shared Types Crate
//!
//! Domain entities shared across the round-execution pipeline: runtime
//! block headers, storage receipts, executor commitments and committee
//! descriptors.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a subsystem
//!   boundary is defined here.
//! - **Canonical Bytes**: anything that gets hashed or signed implements
//!   [`encoding::CanonicalEncode`], a deterministic tag-ordered binary
//!   encoding, so digests agree across all participating nodes.
//! - **No Ambient State**: verification helpers take their collaborators
//!   (keys, namespaces) as arguments; nothing reads process-global state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commitment;
pub mod committee;
pub mod encoding;
pub mod entities;
pub mod errors;
pub mod header;
pub mod receipt;
pub mod registry;

pub use commitment::{
    sign_executor_commitment, sign_proposed_batch, ComputeBody, ComputeResultsHeader,
    ExecutorCommitment, ProposedBatch, SignedProposedBatch,
};
pub use committee::{Committee, CommitteeMember, EpochSnapshot, Role};
pub use encoding::{CanonicalEncode, CanonicalWriter};
pub use entities::{Epoch, Hash, Namespace, Round, WriteLog, WriteLogEntry};
pub use errors::{CommitmentError, ReceiptError};
pub use header::{AnnotatedBlock, Block, BlockHeader, HeaderType, LightBlock};
pub use receipt::{sign_receipt, ApplyOp, Receipt, ReceiptBody, RootType, StorageRoot};
pub use registry::{ExecutorParameters, RuntimeDescriptor, TxnSchedulerParameters};
