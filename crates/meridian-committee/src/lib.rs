//! # Committee Node Controller
//!
//! Drives a single runtime worker through the lifecycle of one round:
//! waiting for a batch, processing it through the sandboxed runtime,
//! committing results to storage, publishing the executor commitment, and
//! waiting for finalization.
//!
//! ## State machine
//!
//! ```text
//! NotReady ──compute member at epoch──→ WaitingForBatch
//! WaitingForBatch ──batch for current block──→ ProcessingBatch (worker)
//!                                            → WaitingForEvent (backup)
//! WaitingForBatch ──batch for future block──→ WaitingForBlock
//! WaitingForBlock ──awaited block arrives──→ ProcessingBatch / WaitingForEvent
//! WaitingForEvent ──discrepancy event──→ ProcessingBatch
//! ProcessingBatch ──results──→ propose ──→ WaitingForFinalize
//! ProcessingBatch ──new block / worker abort──→ abort ──→ WaitingForFinalize
//! WaitingForFinalize ──new block──→ WaitingForBatch
//! ```
//!
//! The cross-node lock guards state inspection and transition only; it is
//! never held across an external call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod ports;
pub mod state;

pub use config::Config;
pub use error::CommitteeError;
pub use node::{BatchDispatch, CommitteeNode, PeerMessage};
pub use ports::outbound::ComputedBatch;
pub use state::{Batch, DispatchedBatch, NodeStateName};
