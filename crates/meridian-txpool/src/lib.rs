//! # Transaction Pool Subsystem
//!
//! Ingests, validates, deduplicates, republishes and schedules runtime
//! transactions for one runtime.
//!
//! ## Pipeline
//!
//! ```text
//! submit ──→ [seen cache guard] ──→ [check queue] ──→ check worker
//!                                                        │ runtime check_tx
//!                                                        ▼
//!                            [scheduling queue] ←── accepted transactions
//!                                   │                    │
//!                 get_scheduled_batch                    └─→ publish (local)
//!                                   │
//!             republish / recheck / flush workers keep the queue honest
//! ```
//!
//! ## Domain Invariants
//!
//! - No two entries in the scheduling queue share a fingerprint.
//! - A successful non-recheck submission leaves its fingerprint in the
//!   seen cache.
//! - A transaction failing a recheck is removed from the scheduling queue
//!   by the next check-worker cycle.
//! - Both queues are bounded; submission fails fast with `QueueFull`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

pub use config::Config;
pub use domain::block_info::BlockInfo;
pub use domain::errors::TxPoolError;
pub use domain::transaction::{
    CheckTxResult, CheckedTransaction, PendingTx, TransactionMeta, TxWeight,
};
pub use service::TxPool;
