//! # Roothash Round State Machine
//!
//! Advances block rounds for every registered runtime by collecting
//! executor commitments, detecting discrepancies between primary workers,
//! and finalizing results into the per-runtime block chain.
//!
//! ## Round progression
//!
//! ```text
//!            commitments agree
//! Executing ────────────────────→ finalize Normal block
//!     │ disagreement / timeout
//!     ▼
//! Discrepancy ──backups agree──→ finalize Normal block
//!     │ timeout / disagreement
//!     ▼
//! RoundFailed block (state preserved, round advances)
//! ```
//!
//! Epoch transitions and proposer timeouts cut across the progression:
//! the former emits an `EpochTransition` block and disarms any timeout,
//! the latter fails the round immediately.
//!
//! Every finalized block is appended to the per-runtime chain and streamed
//! to subscribers together with the enclosing consensus height, in
//! strictly ascending round order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod error;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

pub use domain::commitment_pool::{CommitmentPool, FinalizeOutcome};
pub use error::RoothashError;
pub use events::{DiscrepancyDetectedEvent, Event, ExecutorCommittedEvent, FinalizedEvent};
pub use service::{ConsensusParameters, RoothashService};
