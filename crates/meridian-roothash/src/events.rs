//! Events emitted by the round state machine.

use shared_crypto::PublicKey;
use shared_types::{ExecutorCommitment, Round};

/// A round was finalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedEvent {
    /// The finalized round.
    pub round: Round,
    /// Committers whose results match the finalized header.
    pub good_compute_nodes: Vec<PublicKey>,
    /// Committers whose results diverge from the finalized header.
    pub bad_compute_nodes: Vec<PublicKey>,
}

/// An executor commitment was accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorCommittedEvent {
    /// The accepted commitment.
    pub commit: ExecutorCommitment,
}

/// Primary workers disagreed on the round's results; backup workers must
/// resolve the round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscrepancyDetectedEvent {
    /// The round in dispute.
    pub round: Round,
}

/// A roothash event together with the consensus height it occurred at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedEvent {
    /// Consensus height the event occurred at.
    pub height: u64,
    /// The event.
    pub event: Event,
}

/// Events observable per consensus height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A round was finalized.
    Finalized(FinalizedEvent),
    /// An executor commitment was accepted.
    ExecutorCommitted(ExecutorCommittedEvent),
    /// A compute discrepancy was detected.
    DiscrepancyDetected(DiscrepancyDetectedEvent),
}
