//! Outbound (driven) ports for the transaction pool.
//!
//! These traits define the pool's dependencies on external systems: the
//! sandboxed runtime host that checks transactions and the P2P transport
//! that publishes them.

use crate::domain::errors::TxPoolError;
use crate::domain::transaction::CheckTxResult;
use async_trait::async_trait;
use shared_types::{Block, Epoch, LightBlock};
use std::sync::Arc;
use std::time::Duration;

/// The pool's view of the hosted runtime: transaction checks.
#[async_trait]
pub trait CheckTxHost: Send + Sync {
    /// Check the validity of a raw transaction batch against the given
    /// block context.
    ///
    /// Returns one result per input transaction, in input order.
    async fn check_tx(
        &self,
        block: &Block,
        consensus_block: &LightBlock,
        epoch: Epoch,
        max_messages: u32,
        batch: Vec<Vec<u8>>,
    ) -> Result<Vec<CheckTxResult>, TxPoolError>;
}

/// A runtime host provisioner.
#[async_trait]
pub trait RuntimeHostProvisioner: Send + Sync {
    /// Wait for the hosted runtime to be provisioned and return it.
    async fn wait_hosted_runtime(&self) -> Result<Arc<dyn CheckTxHost>, TxPoolError>;
}

/// A mechanism for publishing transactions to remote peers.
#[async_trait]
pub trait TransactionPublisher: Send + Sync {
    /// Publish a raw transaction.
    async fn publish_tx(&self, tx: &[u8]) -> Result<(), TxPoolError>;

    /// The minimum republish interval the transport requires. Publishing
    /// the same transaction more quickly may silently drop it.
    fn min_republish_interval(&self) -> Duration;
}
