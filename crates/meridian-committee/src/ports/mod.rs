//! Ports to external collaborators.

pub mod outbound;

pub use outbound::{
    BatchExecutionHost, CommitmentSubmitter, ComputedBatch, MergeDispatch, StorageClient,
};
