//! # Core Domain Entities
//!
//! Primitive identifiers shared by every subsystem: runtime namespaces,
//! cryptographic digests, rounds and epochs.

use serde::{Deserialize, Serialize};
use shared_crypto::sha3_256;
use std::fmt;

/// A block round within a runtime. Monotonically increasing.
pub type Round = u64;

/// Consensus-driven logical time. Committee membership is stable within
/// one epoch.
pub type Epoch = u64;

/// A 32-byte identifier distinguishing runtimes.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Namespace(pub [u8; 32]);

impl Namespace {
    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "…")
    }
}

/// A 32-byte cryptographic digest.
///
/// The all-zero value is the canonical empty hash; equality is byte-equal.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The canonical empty hash.
    pub const EMPTY: Hash = Hash([0u8; 32]);

    /// Whether this is the canonical empty hash.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Digest arbitrary bytes into a hash.
    pub fn digest_bytes(data: &[u8]) -> Self {
        Self(sha3_256(data))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single key/value write produced by runtime execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteLogEntry {
    /// Storage key.
    pub key: Vec<u8>,
    /// New value. Empty means deletion.
    pub value: Vec<u8>,
}

/// An ordered list of writes to apply to a storage root.
pub type WriteLog = Vec<WriteLogEntry>;
