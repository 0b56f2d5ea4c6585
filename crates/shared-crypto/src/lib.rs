//! # Shared Crypto - Signing and Digest Primitives
//!
//! Cryptographic building blocks used across the round-execution pipeline.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA3-256 | Canonical digests of headers and envelopes |
//! | `signatures` | Ed25519 | Commitments, receipts, proposed batches |
//!
//! All signing is domain-separated: a [`SignatureContext`] is mixed into
//! every signed payload so a signature produced for one purpose can never
//! be replayed for another. Contexts can additionally be bound to a runtime
//! namespace, which keeps commitments from one runtime out of another.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod signatures;

pub use errors::CryptoError;
pub use hashing::{sha3_256, Sha3Hasher};
pub use signatures::{
    verify_many_to_one, PublicKey, RawSignature, Signature, SignatureContext, Signer,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
