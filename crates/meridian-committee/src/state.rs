//! Controller state machine.

use shared_types::{BlockHeader, SignedProposedBatch};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// A batch of raw runtime transactions.
pub type Batch = Vec<Vec<u8>>;

/// A batch together with the transaction scheduler's signed dispatch
/// envelope.
#[derive(Clone, Debug)]
pub struct DispatchedBatch {
    /// The raw transactions to execute.
    pub batch: Batch,
    /// The scheduler's signed envelope; its header names the block the
    /// batch is based on.
    pub dispatch: SignedProposedBatch,
}

/// Names of controller states, broadcast on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStateName {
    /// Not a compute member this epoch.
    NotReady,
    /// Waiting for a batch dispatch.
    WaitingForBatch,
    /// Holding a batch that is based on a block not yet observed.
    WaitingForBlock,
    /// Backup worker holding a batch, waiting for a discrepancy event.
    WaitingForEvent,
    /// Executing a batch through the runtime worker.
    ProcessingBatch,
    /// Waiting for the round to be finalized.
    WaitingForFinalize,
}

impl std::fmt::Display for NodeStateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotReady => "NotReady",
            Self::WaitingForBatch => "WaitingForBatch",
            Self::WaitingForBlock => "WaitingForBlock",
            Self::WaitingForEvent => "WaitingForEvent",
            Self::ProcessingBatch => "ProcessingBatch",
            Self::WaitingForFinalize => "WaitingForFinalize",
        };
        write!(f, "{name}")
    }
}

/// Controller state, carrying the data each phase needs.
#[derive(Debug)]
pub enum NodeState {
    /// Not a compute member this epoch.
    NotReady,
    /// Waiting for a batch dispatch.
    WaitingForBatch,
    /// Holding a batch based on a block this node has not seen yet.
    WaitingForBlock {
        /// The pending batch.
        pending: DispatchedBatch,
        /// The header the batch is based on.
        header: BlockHeader,
    },
    /// Backup worker holding a batch, waiting for a discrepancy event.
    WaitingForEvent {
        /// The pending batch.
        pending: DispatchedBatch,
    },
    /// Executing a batch.
    ProcessingBatch {
        /// The dispatch the batch arrived under.
        dispatch: SignedProposedBatch,
        /// Cancellation token for the in-flight execution.
        cancel: CancellationToken,
        /// Sequence number matching results to this execution.
        seq: u64,
        /// When processing started.
        started_at: Instant,
    },
    /// Waiting for the round to finalize.
    WaitingForFinalize {
        /// When processing started, for latency accounting.
        started_at: Instant,
    },
}

impl NodeState {
    /// The state's name.
    pub fn name(&self) -> NodeStateName {
        match self {
            Self::NotReady => NodeStateName::NotReady,
            Self::WaitingForBatch => NodeStateName::WaitingForBatch,
            Self::WaitingForBlock { .. } => NodeStateName::WaitingForBlock,
            Self::WaitingForEvent { .. } => NodeStateName::WaitingForEvent,
            Self::ProcessingBatch { .. } => NodeStateName::ProcessingBatch,
            Self::WaitingForFinalize { .. } => NodeStateName::WaitingForFinalize,
        }
    }
}

/// Whether a transition between the named states is allowed.
pub fn is_valid_transition(from: NodeStateName, to: NodeStateName) -> bool {
    use NodeStateName::*;
    let allowed: &[NodeStateName] = match from {
        NotReady => &[WaitingForBatch, NotReady],
        WaitingForBatch => &[
            WaitingForBatch,
            WaitingForBlock,
            WaitingForEvent,
            ProcessingBatch,
            NotReady,
        ],
        WaitingForBlock => &[
            WaitingForBlock,
            WaitingForBatch,
            WaitingForEvent,
            ProcessingBatch,
            NotReady,
        ],
        WaitingForEvent => &[WaitingForBatch, ProcessingBatch, NotReady],
        ProcessingBatch => &[WaitingForFinalize, WaitingForBatch, NotReady],
        WaitingForFinalize => &[WaitingForBatch, NotReady],
    };
    allowed.contains(&to)
}
