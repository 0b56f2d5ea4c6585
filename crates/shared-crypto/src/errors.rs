//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Signature verification failed
    #[error("signature verification failed")]
    VerifyFailed,

    /// Invalid public key bytes (not a valid curve point)
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Invalid signature format
    #[error("malformed signature")]
    MalformedSignature,
}
