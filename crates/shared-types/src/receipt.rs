//! # Storage Receipts
//!
//! A receipt is a signed statement by a storage node that a set of merkle
//! roots was persisted for a given runtime and round. Executor commitments
//! carry receipt signatures so the rest of the committee can check that
//! results were durably stored before finalizing a round.

use crate::encoding::{CanonicalEncode, CanonicalWriter};
use crate::entities::{Hash, Namespace, Round, WriteLog};
use crate::errors::ReceiptError;
use serde::{Deserialize, Serialize};
use shared_crypto::{Signature, SignatureContext, Signer};

/// Domain-separation tag for receipt signatures.
const RECEIPT_SIGNATURE_TAG: &[u8] = b"meridian/storage: receipt";

/// Receipt body version accepted by verifiers.
pub const RECEIPT_VERSION: u16 = 1;

/// The context under which receipt bodies are signed.
pub fn receipt_signature_context() -> SignatureContext {
    SignatureContext::from_tag(RECEIPT_SIGNATURE_TAG)
}

/// The type of a storage root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RootType {
    /// Invalid root type; never stored.
    Invalid = 0,
    /// I/O root covering transaction inputs and outputs.
    Io = 1,
    /// State root covering the runtime state tree.
    State = 2,
}

/// A storage root qualified by its runtime, round and type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRoot {
    /// Runtime the root belongs to.
    pub namespace: Namespace,
    /// Round the root was produced in.
    pub round: Round,
    /// Root type.
    pub root_type: RootType,
    /// The root digest.
    pub hash: Hash,
}

/// A single apply operation submitted to the storage backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOp {
    /// Type of the destination root.
    pub root_type: RootType,
    /// Round the source root belongs to.
    pub src_round: Round,
    /// Root to apply the write log against.
    pub src_root: Hash,
    /// Expected root after applying the write log.
    pub dst_root: Hash,
    /// The writes to apply.
    pub write_log: WriteLog,
}

/// The signed portion of a storage receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptBody {
    /// Receipt format version.
    pub version: u16,
    /// Runtime the receipt covers.
    pub namespace: Namespace,
    /// Round the receipt covers.
    pub round: Round,
    /// Types of the persisted roots, in order.
    pub root_types: Vec<RootType>,
    /// The persisted roots, in the same order.
    pub roots: Vec<Hash>,
}

impl CanonicalEncode for ReceiptBody {
    fn encode_fields(&self, w: &mut CanonicalWriter) {
        w.write_u16(1, self.version);
        w.write_array(2, self.namespace.as_bytes());
        w.write_u64(3, self.round);
        let types: Vec<u8> = self.root_types.iter().map(|t| *t as u8).collect();
        w.write_bytes(4, &types);
        let mut roots = Vec::with_capacity(self.roots.len() * 32);
        for r in &self.roots {
            roots.extend_from_slice(r.as_bytes());
        }
        w.write_bytes(5, &roots);
    }
}

/// A signed storage receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// The signed body.
    pub body: ReceiptBody,
    /// Signature over the canonical encoding of the body.
    pub signature: Signature,
}

impl Receipt {
    /// Verify the receipt's signature over its body.
    pub fn verify(&self) -> Result<(), ReceiptError> {
        if self.body.version != RECEIPT_VERSION {
            return Err(ReceiptError::InvalidVersion(self.body.version));
        }
        self.signature
            .verify(&receipt_signature_context(), &self.body.canonical_encode())
            .map_err(|_| ReceiptError::VerifyFailed)
    }
}

/// Sign a receipt binding the given roots to `(namespace, round)`.
pub fn sign_receipt(
    signer: &Signer,
    namespace: Namespace,
    round: Round,
    root_types: Vec<RootType>,
    roots: Vec<Hash>,
) -> Receipt {
    let body = ReceiptBody {
        version: RECEIPT_VERSION,
        namespace,
        round,
        root_types,
        roots,
    };
    let signature = signer.sign_bundled(&receipt_signature_context(), &body.canonical_encode());
    Receipt { body, signature }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_receipt_verifies() {
        let signer = Signer::generate();
        let receipt = sign_receipt(
            &signer,
            Namespace([1; 32]),
            7,
            vec![RootType::Io, RootType::State],
            vec![Hash::digest_bytes(b"io"), Hash::digest_bytes(b"state")],
        );
        assert!(receipt.verify().is_ok());
    }

    #[test]
    fn test_tampered_receipt_rejected() {
        let signer = Signer::generate();
        let mut receipt = sign_receipt(
            &signer,
            Namespace([1; 32]),
            7,
            vec![RootType::Io, RootType::State],
            vec![Hash::EMPTY, Hash::EMPTY],
        );
        receipt.body.round = 8;
        assert_eq!(receipt.verify(), Err(ReceiptError::VerifyFailed));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let signer = Signer::generate();
        let mut receipt = sign_receipt(&signer, Namespace([1; 32]), 7, vec![], vec![]);
        receipt.body.version = 2;
        assert!(matches!(
            receipt.verify(),
            Err(ReceiptError::InvalidVersion(2))
        ));
    }
}
