//! # Integration Test Harness
//!
//! In-memory collaborators for exercising the round-execution pipeline
//! end to end: committee key fixtures, a storage backend that signs real
//! receipts, a staking module with escrow accounts, and helpers that
//! build executor commitments the way a full committee would.

use async_trait::async_trait;
use meridian_committee::ports::outbound::StorageClient;
use meridian_committee::CommitteeError;
use meridian_roothash::ports::StakingGateway;
use meridian_roothash::RoothashError;
use parking_lot::Mutex;
use shared_crypto::{PublicKey, Signature, Signer};
use shared_types::receipt::sign_receipt;
use shared_types::{
    sign_executor_commitment, sign_proposed_batch, ApplyOp, Block, Committee, CommitteeMember,
    ComputeBody, ComputeResultsHeader, ExecutorCommitment, Hash, Namespace, ProposedBatch,
    Receipt, Role, RootType, Round,
};
use std::collections::HashMap;
use std::sync::Arc;

/// A generated executor/storage committee with its signing keys.
pub struct TestCommittee {
    /// Primary worker keys, in election order.
    pub workers: Vec<Arc<Signer>>,
    /// Backup worker keys, in election order.
    pub backups: Vec<Arc<Signer>>,
    /// Storage committee keys.
    pub storage: Vec<Arc<Signer>>,
    /// The executor committee descriptor.
    pub committee: Committee,
}

impl TestCommittee {
    /// Generate a deterministic committee.
    pub fn generate(n_workers: u8, n_backups: u8, n_storage: u8) -> Self {
        let workers: Vec<Arc<Signer>> = (0..n_workers)
            .map(|i| Arc::new(Signer::from_seed([i + 1; 32])))
            .collect();
        let backups: Vec<Arc<Signer>> = (0..n_backups)
            .map(|i| Arc::new(Signer::from_seed([i + 101; 32])))
            .collect();
        let storage: Vec<Arc<Signer>> = (0..n_storage)
            .map(|i| Arc::new(Signer::from_seed([i + 201; 32])))
            .collect();

        let mut members: Vec<CommitteeMember> = workers
            .iter()
            .map(|s| CommitteeMember {
                public_key: s.public_key(),
                role: Role::Worker,
            })
            .collect();
        members.extend(backups.iter().map(|s| CommitteeMember {
            public_key: s.public_key(),
            role: Role::BackupWorker,
        }));

        Self {
            workers,
            backups,
            storage,
            committee: Committee { members },
        }
    }

    /// The worker acting as transaction scheduler for `round`.
    pub fn scheduler_for(&self, round: Round) -> &Arc<Signer> {
        let key = self
            .committee
            .transaction_scheduler(round)
            .expect("committee has workers")
            .public_key;
        self.workers
            .iter()
            .find(|s| s.public_key() == key)
            .expect("scheduler is a worker")
    }

    /// Storage receipt signatures from the whole storage committee over
    /// the given roots.
    pub fn storage_signatures(
        &self,
        namespace: Namespace,
        round: Round,
        roots: [Hash; 2],
    ) -> Vec<Signature> {
        self.storage
            .iter()
            .map(|signer| {
                sign_receipt(
                    signer,
                    namespace,
                    round,
                    vec![RootType::Io, RootType::State],
                    roots.to_vec(),
                )
                .signature
            })
            .collect()
    }
}

/// The root of a single-transaction input/output tree.
///
/// Opaque but deterministic: every node building the same transaction set
/// arrives at the same digest.
pub fn transaction_tree_root<A: AsRef<[u8]>, B: AsRef<[u8]>>(txs: &[(A, B)]) -> Hash {
    let mut data = Vec::new();
    for (input, output) in txs {
        let (input, output) = (input.as_ref(), output.as_ref());
        data.extend_from_slice(&(input.len() as u64).to_le_bytes());
        data.extend_from_slice(input);
        data.extend_from_slice(&(output.len() as u64).to_le_bytes());
        data.extend_from_slice(output);
    }
    Hash::digest_bytes(&data)
}

/// Build executor commitments from every primary worker over identical
/// results, the way an agreeing committee would. Returns the commitments
/// together with the header they commit to.
pub fn generate_executor_commitments(
    tc: &TestCommittee,
    runtime: Namespace,
    child: &Block,
    io_root: Hash,
) -> (ComputeResultsHeader, Vec<ExecutorCommitment>) {
    let round = child.header.round + 1;
    let header = ComputeResultsHeader {
        round,
        previous_hash: child.header.encoded_hash(),
        io_root,
        state_root: io_root,
        messages_hash: Hash::EMPTY,
    };
    let storage_signatures = tc.storage_signatures(runtime, round, [io_root, io_root]);

    let dispatch = sign_proposed_batch(
        tc.scheduler_for(child.header.round),
        &runtime,
        ProposedBatch {
            io_root: Hash::EMPTY,
            storage_signatures: Vec::new(),
            header: child.header.clone(),
        },
    );

    let commits = tc
        .workers
        .iter()
        .map(|worker| {
            sign_executor_commitment(
                worker,
                &runtime,
                ComputeBody {
                    header: header.clone(),
                    storage_signatures: storage_signatures.clone(),
                    input_root: Hash::EMPTY,
                    input_storage_signatures: Vec::new(),
                    txn_scheduler_signature: dispatch.signature,
                    rak_signature: Default::default(),
                },
            )
        })
        .collect();
    (header, commits)
}

/// An escrow-taking event recorded by the in-memory staking module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TakeEscrowEvent {
    /// The entity whose escrow was taken.
    pub owner: PublicKey,
    /// The amount taken.
    pub amount: u64,
}

/// In-memory staking module with per-entity escrow accounts and
/// per-runtime balances.
#[derive(Default)]
pub struct InMemoryStaking {
    escrows: Mutex<HashMap<PublicKey, u64>>,
    runtime_accounts: Mutex<HashMap<Namespace, u64>>,
    events: Mutex<Vec<TakeEscrowEvent>>,
}

impl InMemoryStaking {
    /// Create an empty staking module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add escrow backing an entity.
    pub fn add_escrow(&self, owner: PublicKey, amount: u64) {
        *self.escrows.lock().entry(owner).or_insert(0) += amount;
    }

    /// The escrow balance of an entity.
    pub fn escrow_balance(&self, owner: &PublicKey) -> u64 {
        self.escrows.lock().get(owner).copied().unwrap_or(0)
    }

    /// The balance of a runtime's account.
    pub fn runtime_balance(&self, runtime: &Namespace) -> u64 {
        self.runtime_accounts
            .lock()
            .get(runtime)
            .copied()
            .unwrap_or(0)
    }

    /// All recorded escrow-taking events.
    pub fn take_escrow_events(&self) -> Vec<TakeEscrowEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl StakingGateway for InMemoryStaking {
    async fn take_escrow(
        &self,
        node: PublicKey,
        runtime: Namespace,
    ) -> Result<u64, RoothashError> {
        let amount = self.escrows.lock().remove(&node).unwrap_or(0);
        *self.runtime_accounts.lock().entry(runtime).or_insert(0) += amount;
        self.events.lock().push(TakeEscrowEvent {
            owner: node,
            amount,
        });
        Ok(amount)
    }
}

/// In-memory storage backend that applies write logs and returns real
/// signed receipts.
pub struct InMemoryStorage {
    signer: Arc<Signer>,
}

impl InMemoryStorage {
    /// Create a storage backend signing receipts with the given key.
    pub fn new(signer: Arc<Signer>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl StorageClient for InMemoryStorage {
    async fn apply_batch(
        &self,
        namespace: Namespace,
        dst_round: Round,
        ops: Vec<ApplyOp>,
    ) -> Result<Vec<Receipt>, CommitteeError> {
        let root_types: Vec<RootType> = ops.iter().map(|op| op.root_type).collect();
        let roots: Vec<Hash> = ops.iter().map(|op| op.dst_root).collect();
        Ok(vec![sign_receipt(
            &self.signer,
            namespace,
            dst_round,
            root_types,
            roots,
        )])
    }
}
