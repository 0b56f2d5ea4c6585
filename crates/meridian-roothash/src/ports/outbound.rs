//! Outbound (driven) ports for the round state machine.

use crate::error::RoothashError;
use async_trait::async_trait;
use shared_crypto::PublicKey;
use shared_types::Namespace;

/// Staking operations the state machine depends on for misbehaviour
/// handling.
#[async_trait]
pub trait StakingGateway: Send + Sync {
    /// Slash the escrow of the entity backing `node` and transfer the
    /// slashed amount to the runtime's account.
    ///
    /// Returns the slashed amount.
    async fn take_escrow(
        &self,
        node: PublicKey,
        runtime: Namespace,
    ) -> Result<u64, RoothashError>;
}
