//! # Executor Commitments
//!
//! Signed statements by executor nodes about the result of a round, and
//! the proposed-batch envelope the round's transaction scheduler signs
//! when dispatching work.

use crate::encoding::{CanonicalEncode, CanonicalWriter};
use crate::entities::{Hash, Namespace, Round};
use crate::errors::{CommitmentError, ReceiptError};
use crate::header::BlockHeader;
use crate::receipt::{ReceiptBody, RootType, RECEIPT_VERSION};
use serde::{Deserialize, Serialize};
use shared_crypto::{RawSignature, Signature, SignatureContext, Signer};

const EXECUTOR_COMMITMENT_TAG: &[u8] = b"meridian/roothash: executor commitment";
const PROPOSED_BATCH_TAG: &[u8] = b"meridian/roothash: proposed batch";

/// The context under which executor commitments for `runtime` are signed.
pub fn executor_commitment_context(runtime: &Namespace) -> SignatureContext {
    SignatureContext::from_tag(EXECUTOR_COMMITMENT_TAG).for_namespace(runtime.as_bytes())
}

/// The context under which proposed batches for `runtime` are signed.
pub fn proposed_batch_context(runtime: &Namespace) -> SignatureContext {
    SignatureContext::from_tag(PROPOSED_BATCH_TAG).for_namespace(runtime.as_bytes())
}

/// The result header all executors must agree on to finalize a round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeResultsHeader {
    /// Round the results are for.
    pub round: Round,
    /// Encoded hash of the block the batch was computed against.
    pub previous_hash: Hash,
    /// Resulting I/O root.
    pub io_root: Hash,
    /// Resulting state root.
    pub state_root: Hash,
    /// Hash of emitted runtime messages.
    pub messages_hash: Hash,
}

impl CanonicalEncode for ComputeResultsHeader {
    fn encode_fields(&self, w: &mut CanonicalWriter) {
        w.write_u64(1, self.round);
        w.write_hash(2, &self.previous_hash);
        w.write_hash(3, &self.io_root);
        w.write_hash(4, &self.state_root);
        w.write_hash(5, &self.messages_hash);
    }
}

impl ComputeResultsHeader {
    /// The encoded cryptographic hash of the header.
    pub fn encoded_hash(&self) -> Hash {
        self.canonical_hash()
    }
}

/// The body of an executor commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBody {
    /// The results header being committed to.
    pub header: ComputeResultsHeader,
    /// Storage receipt signatures over the result roots.
    pub storage_signatures: Vec<Signature>,
    /// Root of the input batch the results were computed from.
    pub input_root: Hash,
    /// Storage receipt signatures over the input batch.
    pub input_storage_signatures: Vec<Signature>,
    /// The transaction scheduler's signature over the dispatched batch.
    pub txn_scheduler_signature: Signature,
    /// Runtime attestation signature over the results.
    pub rak_signature: RawSignature,
}

impl CanonicalEncode for ComputeBody {
    fn encode_fields(&self, w: &mut CanonicalWriter) {
        w.write_nested(1, &self.header);
        w.write_signatures(2, &self.storage_signatures);
        w.write_hash(3, &self.input_root);
        w.write_signatures(4, &self.input_storage_signatures);
        w.write_signature(5, &self.txn_scheduler_signature);
        w.write_bytes(6, self.rak_signature.as_bytes());
    }
}

impl ComputeBody {
    /// Validate that a storage receipt body matches the committed results.
    pub fn verify_storage_receipt(
        &self,
        namespace: Namespace,
        receipt: &ReceiptBody,
    ) -> Result<(), ReceiptError> {
        if receipt.version != RECEIPT_VERSION {
            return Err(ReceiptError::InvalidVersion(receipt.version));
        }
        if receipt.namespace != namespace {
            return Err(ReceiptError::UnexpectedNamespace);
        }
        if receipt.round != self.header.round {
            return Err(ReceiptError::UnexpectedRound {
                expected: self.header.round,
                actual: receipt.round,
            });
        }
        let expected_types = [RootType::Io, RootType::State];
        let expected_roots = [self.header.io_root, self.header.state_root];
        if receipt.root_types.len() != expected_types.len()
            || receipt.roots.len() != expected_roots.len()
        {
            return Err(ReceiptError::RootCountMismatch);
        }
        for idx in 0..expected_types.len() {
            if receipt.root_types[idx] != expected_types[idx] {
                return Err(ReceiptError::RootTypeMismatch);
            }
            if receipt.roots[idx] != expected_roots[idx] {
                return Err(ReceiptError::RootMismatch);
            }
        }
        Ok(())
    }
}

/// A signed executor commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorCommitment {
    /// The committed body.
    pub body: ComputeBody,
    /// Signature over the canonical encoding of the body.
    pub signature: Signature,
}

impl ExecutorCommitment {
    /// Verify the commitment envelope for the given runtime.
    pub fn verify(&self, runtime: &Namespace) -> Result<(), CommitmentError> {
        self.signature
            .verify(
                &executor_commitment_context(runtime),
                &self.body.canonical_encode(),
            )
            .map_err(|_| CommitmentError::VerifyFailed)
    }
}

/// Sign an executor commitment for a runtime.
pub fn sign_executor_commitment(
    signer: &Signer,
    runtime: &Namespace,
    body: ComputeBody,
) -> ExecutorCommitment {
    let signature = signer.sign_bundled(
        &executor_commitment_context(runtime),
        &body.canonical_encode(),
    );
    ExecutorCommitment { body, signature }
}

/// A batch dispatched by the round's designated transaction scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedBatch {
    /// Root of the proposed input batch.
    pub io_root: Hash,
    /// Storage receipt signatures over the input batch.
    pub storage_signatures: Vec<Signature>,
    /// Header of the block the batch is based on.
    pub header: BlockHeader,
}

impl CanonicalEncode for ProposedBatch {
    fn encode_fields(&self, w: &mut CanonicalWriter) {
        w.write_hash(1, &self.io_root);
        w.write_signatures(2, &self.storage_signatures);
        w.write_nested(3, &self.header);
    }
}

/// A proposed batch signed by the transaction scheduler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposedBatch {
    /// The proposed batch.
    pub batch: ProposedBatch,
    /// The scheduler's signature over the canonical batch encoding.
    pub signature: Signature,
}

impl SignedProposedBatch {
    /// Verify the envelope for the given runtime.
    pub fn verify(&self, runtime: &Namespace) -> Result<(), CommitmentError> {
        self.signature
            .verify(
                &proposed_batch_context(runtime),
                &self.batch.canonical_encode(),
            )
            .map_err(|_| CommitmentError::VerifyFailed)
    }
}

/// Sign a proposed batch for a runtime.
pub fn sign_proposed_batch(
    signer: &Signer,
    runtime: &Namespace,
    batch: ProposedBatch,
) -> SignedProposedBatch {
    let signature = signer.sign_bundled(
        &proposed_batch_context(runtime),
        &batch.canonical_encode(),
    );
    SignedProposedBatch { batch, signature }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_for_round(round: Round) -> ComputeBody {
        ComputeBody {
            header: ComputeResultsHeader {
                round,
                previous_hash: Hash::digest_bytes(b"prev"),
                io_root: Hash::digest_bytes(b"io"),
                state_root: Hash::digest_bytes(b"state"),
                messages_hash: Hash::EMPTY,
            },
            storage_signatures: Vec::new(),
            input_root: Hash::EMPTY,
            input_storage_signatures: Vec::new(),
            txn_scheduler_signature: Signer::generate()
                .sign_bundled(&proposed_batch_context(&Namespace([1; 32])), b"x"),
            rak_signature: RawSignature::default(),
        }
    }

    #[test]
    fn test_commitment_sign_verify() {
        let signer = Signer::generate();
        let runtime = Namespace([1; 32]);
        let commit = sign_executor_commitment(&signer, &runtime, body_for_round(3));
        assert!(commit.verify(&runtime).is_ok());
        assert_eq!(
            commit.verify(&Namespace([2; 32])),
            Err(CommitmentError::VerifyFailed)
        );
    }

    #[test]
    fn test_results_header_hash_differs_by_root() {
        let a = body_for_round(3).header;
        let mut b = a.clone();
        b.io_root = Hash::digest_bytes(b"other io");
        assert_ne!(a.encoded_hash(), b.encoded_hash());
    }

    #[test]
    fn test_verify_storage_receipt_binds_results() {
        let runtime = Namespace([1; 32]);
        let body = body_for_round(3);
        let good = ReceiptBody {
            version: RECEIPT_VERSION,
            namespace: runtime,
            round: 3,
            root_types: vec![RootType::Io, RootType::State],
            roots: vec![body.header.io_root, body.header.state_root],
        };
        assert!(body.verify_storage_receipt(runtime, &good).is_ok());

        let mut wrong = good.clone();
        wrong.roots[1] = Hash::digest_bytes(b"different state");
        assert_eq!(
            body.verify_storage_receipt(runtime, &wrong),
            Err(ReceiptError::RootMismatch)
        );
    }

    #[test]
    fn test_proposed_batch_sign_verify() {
        let signer = Signer::generate();
        let runtime = Namespace([1; 32]);
        let batch = ProposedBatch {
            io_root: Hash::digest_bytes(b"input"),
            storage_signatures: Vec::new(),
            header: BlockHeader::default(),
        };
        let signed = sign_proposed_batch(&signer, &runtime, batch);
        assert!(signed.verify(&runtime).is_ok());

        let mut tampered = signed;
        tampered.batch.io_root = Hash::digest_bytes(b"other input");
        assert!(tampered.verify(&runtime).is_err());
    }
}
