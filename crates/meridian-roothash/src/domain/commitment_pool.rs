//! Per-round executor commitment aggregation.
//!
//! Collects commitments for the round being built, validates them against
//! the runtime's current block and committee, and decides when the round
//! can be finalized, needs backup resolution, or has failed.

use crate::error::RoothashError;
use shared_crypto::{verify_many_to_one, PublicKey, Signature};
use shared_types::receipt::receipt_signature_context;
use shared_types::{
    Block, CanonicalEncode, Committee, ComputeResultsHeader, ExecutorCommitment, Hash, Namespace,
    ProposedBatch, ReceiptBody, Round, RootType, SignedProposedBatch,
};
use std::collections::HashMap;
use tracing::debug;

/// The outcome of a finalization attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// More commitments are required.
    Pending,
    /// The round finalized on the given results.
    Finalized {
        /// The agreed results header.
        header: ComputeResultsHeader,
        /// Storage receipt signatures accompanying the winning results.
        storage_signatures: Vec<Signature>,
        /// Committers matching the winning header.
        good_compute_nodes: Vec<PublicKey>,
        /// Committers diverging from the winning header.
        bad_compute_nodes: Vec<PublicKey>,
    },
    /// Primary workers disagreed (or timed out while incomplete); backup
    /// workers must now commit.
    Discrepancy,
    /// The round cannot be committed.
    Failed,
}

/// Collects and validates executor commitments for one round.
pub struct CommitmentPool {
    committee: Committee,
    round: Round,
    discrepancy: bool,
    commitments: HashMap<PublicKey, ExecutorCommitment>,
}

impl CommitmentPool {
    /// Create a pool for the round following `current_round`.
    pub fn new(committee: Committee, current_round: Round) -> Self {
        Self {
            committee,
            round: current_round + 1,
            discrepancy: false,
            commitments: HashMap::new(),
        }
    }

    /// The round being built.
    pub fn round(&self) -> Round {
        self.round
    }

    /// Whether the pool is resolving a discrepancy.
    pub fn in_discrepancy(&self) -> bool {
        self.discrepancy
    }

    /// Whether any commitment has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    /// Validate and accept an executor commitment.
    pub fn add_executor_commitment(
        &mut self,
        runtime: &Namespace,
        current_block: &Block,
        commitment: ExecutorCommitment,
    ) -> Result<(), RoothashError> {
        commitment
            .verify(runtime)
            .map_err(|_| RoothashError::VerifyFailed)?;
        let signer = commitment.signature.public_key;

        // While executing, only primary workers may commit; during
        // discrepancy resolution, only backup workers.
        let eligible = if self.discrepancy {
            self.committee.is_backup_worker(&signer)
        } else {
            self.committee.is_worker(&signer)
        };
        if !eligible {
            return Err(RoothashError::NotCommitteeMember);
        }
        if self.commitments.contains_key(&signer) {
            return Err(RoothashError::AlreadyCommitted);
        }

        let header = &commitment.body.header;
        if header.round != self.round
            || header.previous_hash != current_block.header.encoded_hash()
        {
            return Err(RoothashError::NotBasedOnCurrentBlock {
                expected: self.round,
                got: header.round,
            });
        }

        // The embedded dispatch must be signed by the round's designated
        // transaction scheduler over the batch the results were computed
        // from.
        let scheduler = self
            .committee
            .transaction_scheduler(current_block.header.round)
            .ok_or(RoothashError::InvalidSchedulerSignature)?;
        if commitment.body.txn_scheduler_signature.public_key != scheduler.public_key {
            return Err(RoothashError::InvalidSchedulerSignature);
        }
        let dispatch = SignedProposedBatch {
            batch: ProposedBatch {
                io_root: commitment.body.input_root,
                storage_signatures: commitment.body.input_storage_signatures.clone(),
                header: current_block.header.clone(),
            },
            signature: commitment.body.txn_scheduler_signature,
        };
        dispatch
            .verify(runtime)
            .map_err(|_| RoothashError::InvalidSchedulerSignature)?;

        // Result roots must be backed by signed storage.
        let receipt_body = ReceiptBody {
            version: shared_types::receipt::RECEIPT_VERSION,
            namespace: *runtime,
            round: header.round,
            root_types: vec![RootType::Io, RootType::State],
            roots: vec![header.io_root, header.state_root],
        };
        verify_many_to_one(
            &receipt_signature_context(),
            &receipt_body.canonical_encode(),
            &commitment.body.storage_signatures,
        )
        .map_err(|_| RoothashError::StorageReceiptInvalid)?;

        debug!(round = self.round, node = ?signer, "accepted executor commitment");
        self.commitments.insert(signer, commitment);
        Ok(())
    }

    /// Attempt to finalize the round.
    ///
    /// Without `did_timeout`, finalization waits for the full required
    /// set. On a timeout, whatever has been collected decides: agreement
    /// finalizes, anything else escalates (to discrepancy resolution, or
    /// to failure if already resolving).
    pub fn try_finalize(&mut self, did_timeout: bool) -> FinalizeOutcome {
        let required: Vec<PublicKey> = if self.discrepancy {
            self.committee
                .backup_workers()
                .map(|m| m.public_key)
                .collect()
        } else {
            self.committee.workers().map(|m| m.public_key).collect()
        };

        let committed: Vec<&ExecutorCommitment> = required
            .iter()
            .filter_map(|key| self.commitments.get(key))
            .collect();

        if !did_timeout && (required.is_empty() || committed.len() < required.len()) {
            return FinalizeOutcome::Pending;
        }
        if committed.is_empty() {
            // Timed out with nothing to decide on.
            return self.escalate();
        }

        // Group the committed results by their header hash.
        let mut votes: HashMap<Hash, usize> = HashMap::new();
        for commit in &committed {
            *votes.entry(commit.body.header.encoded_hash()).or_insert(0) += 1;
        }
        if votes.len() > 1 || committed.len() < required.len() {
            // Disagreement, or a timeout with missing commitments.
            return self.escalate();
        }

        let winning = committed[0];
        let header = winning.body.header.clone();
        let winning_hash = header.encoded_hash();

        // Account every committer, including primary workers whose round
        // went to discrepancy resolution.
        let mut good = Vec::new();
        let mut bad = Vec::new();
        for (node, commit) in &self.commitments {
            if commit.body.header.encoded_hash() == winning_hash {
                good.push(*node);
            } else {
                bad.push(*node);
            }
        }
        good.sort();
        bad.sort();

        FinalizeOutcome::Finalized {
            storage_signatures: winning.body.storage_signatures.clone(),
            header,
            good_compute_nodes: good,
            bad_compute_nodes: bad,
        }
    }

    fn escalate(&mut self) -> FinalizeOutcome {
        if self.discrepancy {
            return FinalizeOutcome::Failed;
        }
        self.discrepancy = true;
        FinalizeOutcome::Discrepancy
    }
}
