//! The pool's view of the latest runtime block.

use shared_types::{Block, Epoch, LightBlock, RuntimeDescriptor};

/// Information related to a runtime block, as delivered to the pool by the
/// block stream.
#[derive(Clone, Debug)]
pub struct BlockInfo {
    /// The runtime block.
    pub runtime_block: Block,
    /// The consensus light block the runtime block belongs to.
    pub consensus_block: LightBlock,
    /// The epoch the runtime block belongs to.
    pub epoch: Epoch,
    /// The runtime descriptor active for the block.
    pub active_descriptor: RuntimeDescriptor,
}
