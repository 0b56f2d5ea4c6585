//! Transaction pool configuration.

use std::time::Duration;

/// Transaction pool configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum size of the scheduling queue.
    pub max_pool_size: u64,
    /// Maximum number of transactions checked in a single runtime call.
    pub max_check_tx_batch_size: u64,
    /// Capacity of the recently-seen fingerprint cache.
    pub max_last_seen_cache_size: u64,
    /// Cadence of the republish worker.
    pub republish_interval: Duration,
    /// Maximum transactions republished per cycle.
    pub max_republish_batch_size: u64,
    /// Interval (in rounds) at which queued transactions are rechecked and
    /// any non-passing transactions removed.
    pub recheck_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_pool_size: 10_000,
            max_check_tx_batch_size: 10_000,
            max_last_seen_cache_size: 10_000,
            republish_interval: Duration::from_secs(60),
            max_republish_batch_size: 32,
            recheck_interval: 32,
        }
    }
}
