//! Full pipeline test: a transaction flows through the pool, is dispatched
//! to the committee node, executed, committed to storage, published to the
//! round state machine, and comes back as a finalized block that feeds the
//! pool's view.

use async_trait::async_trait;
use integration_tests::{InMemoryStaking, InMemoryStorage};
use meridian_committee::ports::outbound::{BatchExecutionHost, CommitmentSubmitter, ComputedBatch};
use meridian_committee::{CommitteeError, CommitteeNode, NodeStateName};
use meridian_roothash::{ConsensusParameters, RoothashService};
use meridian_txpool::ports::outbound::{CheckTxHost, RuntimeHostProvisioner, TransactionPublisher};
use meridian_txpool::{BlockInfo, CheckTxResult, Config as PoolConfig, TransactionMeta, TxPool, TxPoolError};
use shared_crypto::Signer;
use shared_types::{
    Block, Committee, CommitteeMember, ComputeResultsHeader, Epoch, EpochSnapshot,
    ExecutorCommitment, Hash, HeaderType, LightBlock, Namespace, Role, RuntimeDescriptor,
};
use std::sync::Arc;
use std::time::Duration;

struct PassthroughRuntime;

#[async_trait]
impl CheckTxHost for PassthroughRuntime {
    async fn check_tx(
        &self,
        _block: &Block,
        _consensus_block: &LightBlock,
        _epoch: Epoch,
        _max_messages: u32,
        batch: Vec<Vec<u8>>,
    ) -> Result<Vec<CheckTxResult>, TxPoolError> {
        Ok(batch.iter().map(|_| CheckTxResult::success()).collect())
    }
}

#[async_trait]
impl RuntimeHostProvisioner for PassthroughRuntime {
    async fn wait_hosted_runtime(&self) -> Result<Arc<dyn CheckTxHost>, TxPoolError> {
        Ok(Arc::new(PassthroughRuntime))
    }
}

struct NopPublisher;

#[async_trait]
impl TransactionPublisher for NopPublisher {
    async fn publish_tx(&self, _tx: &[u8]) -> Result<(), TxPoolError> {
        Ok(())
    }

    fn min_republish_interval(&self) -> Duration {
        Duration::from_secs(1)
    }
}

struct ExecutionHost;

#[async_trait]
impl BatchExecutionHost for ExecutionHost {
    async fn execute_batch(
        &self,
        block: &Block,
        batch: Vec<Vec<u8>>,
    ) -> Result<ComputedBatch, CommitteeError> {
        let mut io = Vec::new();
        for tx in &batch {
            io.extend_from_slice(tx);
        }
        let io_root = Hash::digest_bytes(&io);
        Ok(ComputedBatch {
            header: ComputeResultsHeader {
                round: block.header.round + 1,
                previous_hash: block.header.encoded_hash(),
                io_root,
                state_root: io_root,
                messages_hash: Hash::EMPTY,
            },
            io_write_log: Vec::new(),
            state_write_log: Vec::new(),
            rak_signature: Default::default(),
        })
    }

    async fn interrupt_worker(&self) {}
}

/// Publishes commitments straight into the round state machine.
struct ConsensusSubmitter {
    svc: Arc<RoothashService>,
    runtime: Namespace,
}

#[async_trait]
impl CommitmentSubmitter for ConsensusSubmitter {
    async fn publish_commitment(&self, commit: &ExecutorCommitment) -> Result<(), CommitteeError> {
        self.svc
            .executor_commit(&self.runtime, vec![commit.clone()])
            .map_err(|err| CommitteeError::PublishFailed(err.to_string()))
    }
}

async fn wait_state(node: &CommitteeNode, name: NodeStateName) {
    for _ in 0..200 {
        if node.state_name() == name {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("state {name} not reached in time");
}

#[tokio::test]
async fn test_transaction_to_finalized_block() {
    let ns = Namespace([77; 32]);
    let identity = Arc::new(Signer::from_seed([1; 32]));
    let descriptor = RuntimeDescriptor {
        id: ns,
        ..RuntimeDescriptor::default()
    };

    // Round state machine with one registered runtime.
    let staking = Arc::new(InMemoryStaking::new());
    let roothash = Arc::new(RoothashService::new(
        ConsensusParameters::default(),
        staking,
    ));
    roothash.add_runtime(descriptor.clone()).unwrap();
    roothash.process_height(1);

    // A committee of one: the local node is the only worker and thus the
    // round's transaction scheduler.
    let committee = Committee {
        members: vec![CommitteeMember {
            public_key: identity.public_key(),
            role: Role::Worker,
        }],
    };
    let mut committees = std::collections::HashMap::new();
    committees.insert(ns, committee.clone());
    roothash.process_epoch_transition(1, &committees);
    let child = roothash.get_latest_block(&ns).unwrap();
    assert_eq!(child.header.header_type, HeaderType::EpochTransition);

    // Transaction pool fed by a runtime that accepts everything.
    let pool = TxPool::new(
        ns,
        PoolConfig::default(),
        Arc::new(PassthroughRuntime),
        Arc::new(NopPublisher),
    );
    pool.start();
    pool.process_block(BlockInfo {
        runtime_block: child.clone(),
        consensus_block: LightBlock { height: 1, epoch: 1 },
        epoch: 1,
        active_descriptor: descriptor.clone(),
    })
    .unwrap();

    let raw_tx = b"transfer 5 from a to b".to_vec();
    let check = pool
        .submit_tx(raw_tx.clone(), TransactionMeta::default())
        .await
        .unwrap();
    assert!(check.is_success());

    let batch = pool.get_scheduled_batch(true);
    assert_eq!(batch.len(), 1);

    // Committee node wired to in-memory storage and the state machine.
    let storage_signer = Arc::new(Signer::from_seed([9; 32]));
    let node = CommitteeNode::new(
        ns,
        meridian_committee::Config::default(),
        identity.clone(),
        Arc::new(ExecutionHost),
        Arc::new(InMemoryStorage::new(storage_signer)),
        Arc::new(ConsensusSubmitter {
            svc: roothash.clone(),
            runtime: ns,
        }),
        None,
    );
    node.start();
    node.handle_epoch_transition(EpochSnapshot {
        epoch: 1,
        committee,
        local: identity.public_key(),
        merge_member: false,
    });
    node.handle_new_block(&child);

    // The local node is the scheduler: dispatch the pooled batch.
    let raw_batch: Vec<Vec<u8>> = batch.iter().map(|tx| tx.raw().to_vec()).collect();
    let input_root = Hash::digest_bytes(&raw_tx);
    node.handle_batch_from_scheduler(raw_batch, input_root, Vec::new())
        .unwrap();
    wait_state(&node, NodeStateName::WaitingForFinalize).await;

    // The unanimous (single-member) committee finalized the round.
    let finalized = roothash.get_latest_block(&ns).unwrap();
    assert_eq!(finalized.header.round, child.header.round + 1);
    assert_eq!(finalized.header.header_type, HeaderType::Normal);
    assert!(finalized.header.is_child_of(&child.header));
    assert_eq!(
        finalized.header.io_root,
        Hash::digest_bytes(&raw_tx)
    );

    // The new block closes the loop: the controller goes back to waiting
    // and the pool learns about the block and drops the included
    // transaction.
    node.handle_new_block_early(&finalized);
    node.handle_new_block(&finalized);
    assert_eq!(node.state_name(), NodeStateName::WaitingForBatch);

    pool.process_block(BlockInfo {
        runtime_block: finalized,
        consensus_block: LightBlock { height: 2, epoch: 1 },
        epoch: 1,
        active_descriptor: descriptor,
    })
    .unwrap();
    let hashes: Vec<Hash> = batch.iter().map(|tx| tx.hash()).collect();
    pool.remove_tx_batch(&hashes);
    assert_eq!(pool.pending_schedule_size(), 0);

    node.stop().await;
    pool.stop().await;
}
