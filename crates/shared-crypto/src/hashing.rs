//! # SHA3-256 Hashing
//!
//! Single digest algorithm for every canonical hash in the pipeline.
//! Header hashes, transaction fingerprints and signed envelope digests all
//! go through here so that all participating nodes agree byte-for-byte.

use sha3::{Digest, Sha3_256};

/// SHA3-256 hash output (256-bit).
pub type Digest32 = [u8; 32];

/// Stateful SHA3-256 hasher.
pub struct Sha3Hasher {
    inner: Sha3_256,
}

impl Sha3Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha3_256::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> Digest32 {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.inner.finalize());
        out
    }
}

impl Default for Sha3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash data with SHA3-256 (one-shot).
pub fn sha3_256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha3Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
