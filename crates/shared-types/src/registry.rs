//! # Runtime Descriptors
//!
//! The registered parameters of a runtime: executor committee sizing and
//! timeouts, and the transaction scheduler's algorithm and batch limits.

use crate::entities::Namespace;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Executor committee parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorParameters {
    /// Number of primary workers.
    pub group_size: u16,
    /// Number of backup workers.
    pub group_backup_size: u16,
    /// Maximum runtime messages a round may emit.
    pub max_messages: u32,
    /// Round timeout in consensus heights.
    pub round_timeout: u64,
}

impl Default for ExecutorParameters {
    fn default() -> Self {
        Self {
            group_size: 2,
            group_backup_size: 1,
            max_messages: 32,
            round_timeout: 10,
        }
    }
}

/// Transaction scheduler parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnSchedulerParameters {
    /// Name of the scheduling algorithm.
    pub algorithm: String,
    /// How long to wait before flushing an underfull batch.
    pub batch_flush_timeout: Duration,
    /// Maximum number of transactions per batch.
    pub max_batch_size: u64,
    /// Maximum batch size in bytes.
    pub max_batch_size_bytes: u64,
    /// Heights a round may sit without a proposal before any committee
    /// member may request a proposer timeout.
    pub proposer_timeout: u64,
}

impl Default for TxnSchedulerParameters {
    fn default() -> Self {
        Self {
            algorithm: "simple".to_string(),
            batch_flush_timeout: Duration::from_secs(1),
            max_batch_size: 1000,
            max_batch_size_bytes: 16 * 1024 * 1024,
            proposer_timeout: 5,
        }
    }
}

/// The registered descriptor of a runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    /// Runtime identifier.
    pub id: Namespace,
    /// Executor parameters.
    pub executor: ExecutorParameters,
    /// Transaction scheduler parameters.
    pub txn_scheduler: TxnSchedulerParameters,
}
