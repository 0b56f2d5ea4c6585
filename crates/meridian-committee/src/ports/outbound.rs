//! Outbound (driven) ports for the committee node.
//!
//! The controller depends on the sandboxed runtime host for execution,
//! the storage backend for committing write logs, and the consensus
//! transport for publishing commitments.

use crate::error::CommitteeError;
use crate::state::Batch;
use async_trait::async_trait;
use shared_crypto::RawSignature;
use shared_types::{ApplyOp, Block, ComputeResultsHeader, ExecutorCommitment, Namespace, Receipt, Round, WriteLog};

/// The result of executing a batch through the runtime worker.
#[derive(Clone, Debug)]
pub struct ComputedBatch {
    /// The results header the node will commit to.
    pub header: ComputeResultsHeader,
    /// Write log producing the I/O root.
    pub io_write_log: WriteLog,
    /// Write log producing the new state root.
    pub state_write_log: WriteLog,
    /// Runtime attestation signature over the results.
    pub rak_signature: RawSignature,
}

/// The controller's view of the hosted runtime: batch execution.
#[async_trait]
pub trait BatchExecutionHost: Send + Sync {
    /// Execute a batch against the given block.
    async fn execute_batch(
        &self,
        block: &Block,
        batch: Batch,
    ) -> Result<ComputedBatch, CommitteeError>;

    /// Best-effort pre-emption of the runtime worker.
    async fn interrupt_worker(&self);
}

/// The storage backend.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Apply write logs and return signed receipts over the resulting
    /// roots.
    async fn apply_batch(
        &self,
        namespace: Namespace,
        dst_round: Round,
        ops: Vec<ApplyOp>,
    ) -> Result<Vec<Receipt>, CommitteeError>;
}

/// Publishes executor commitments to the consensus layer.
#[async_trait]
pub trait CommitmentSubmitter: Send + Sync {
    /// Publish a signed executor commitment.
    async fn publish_commitment(&self, commit: &ExecutorCommitment) -> Result<(), CommitteeError>;
}

/// Direct hand-off to the merge subsystem when the node is also a merge
/// member.
#[async_trait]
pub trait MergeDispatch: Send + Sync {
    /// Deliver a commitment produced by the local compute worker.
    async fn commitment_ready(&self, commit: ExecutorCommitment);
}
