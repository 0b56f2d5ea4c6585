//! # Ed25519 Signatures
//!
//! Domain-separated Ed25519 signing over canonical payloads.
//!
//! Every signature in the pipeline is made over
//! `SHA3-256(len(context) || context || message)`, where the context is a
//! short static tag optionally extended with a runtime namespace. Signing
//! the digest rather than the raw message keeps signed payloads fixed-size
//! and makes the domain separation explicit at every call site.

use crate::errors::CryptoError;
use crate::hashing::Sha3Hasher;
use ed25519_dalek::{Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use zeroize::Zeroize;

/// A domain-separation context for signatures.
///
/// Contexts are short static byte tags. [`SignatureContext::for_namespace`]
/// derives a runtime-bound variant so envelopes signed for one runtime can
/// never verify for another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureContext(Vec<u8>);

impl SignatureContext {
    /// Create a context from a tag.
    pub fn from_tag(tag: &[u8]) -> Self {
        Self(tag.to_vec())
    }

    /// Derive a context bound to a runtime namespace.
    pub fn for_namespace(&self, namespace: &[u8; 32]) -> Self {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(namespace);
        Self(bytes)
    }

    fn digest(&self, message: &[u8]) -> [u8; 32] {
        let mut hasher = Sha3Hasher::new();
        hasher.update(&(self.0.len() as u64).to_le_bytes());
        hasher.update(&self.0);
        hasher.update(message);
        hasher.finalize()
    }
}

/// An Ed25519 public key (32 bytes).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a context-separated signature over a message.
    pub fn verify(
        &self,
        context: &SignatureContext,
        message: &[u8],
        signature: &RawSignature,
    ) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(&context.digest(message), &sig)
            .map_err(|_| CryptoError::VerifyFailed)
    }
}

/// An Ed25519 signature (64 bytes), without the signer's key.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignature(#[serde_as(as = "Bytes")] pub [u8; 64]);

impl Default for RawSignature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl RawSignature {
    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// A signature bundled with the public key that produced it.
///
/// This is the form carried in block headers and commitment envelopes,
/// where the verifier learns the signer's identity from the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// The signer's public key.
    pub public_key: PublicKey,
    /// The signature bytes.
    pub signature: RawSignature,
}

impl Signature {
    /// Verify this signature over a context-separated message.
    pub fn verify(&self, context: &SignatureContext, message: &[u8]) -> Result<(), CryptoError> {
        self.public_key.verify(context, message, &self.signature)
    }
}

/// Verify that all signatures in a set are valid over the same message.
///
/// An empty signature set does not verify.
pub fn verify_many_to_one(
    context: &SignatureContext,
    message: &[u8],
    signatures: &[Signature],
) -> Result<(), CryptoError> {
    if signatures.is_empty() {
        return Err(CryptoError::VerifyFailed);
    }
    for sig in signatures {
        sig.verify(context, message)?;
    }
    Ok(())
}

/// An Ed25519 signing keypair.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Generate a random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from a secret seed (32 bytes). Deterministic, used by tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message under a context (deterministic, no RNG).
    pub fn sign(&self, context: &SignatureContext, message: &[u8]) -> RawSignature {
        let sig = self.signing_key.sign(&context.digest(message));
        RawSignature(sig.to_bytes())
    }

    /// Sign and bundle with the public key.
    pub fn sign_bundled(&self, context: &SignatureContext, message: &[u8]) -> Signature {
        Signature {
            public_key: self.public_key(),
            signature: self.sign(context, message),
        }
    }
}

impl Drop for Signer {
    fn drop(&mut self) {
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}
