//! Committee node configuration.

use std::time::Duration;

/// Committee node configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long a storage commit may take before the batch is aborted.
    pub storage_commit_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_commit_timeout: Duration::from_secs(5),
        }
    }
}
