//! End-to-end scenarios for the round state machine: genesis, epoch
//! transitions, successful rounds, timeouts and equivocation evidence.

use integration_tests::{
    generate_executor_commitments, transaction_tree_root, InMemoryStaking, TestCommittee,
};
use meridian_roothash::{ConsensusParameters, Event, RoothashService};
use shared_types::{
    sign_proposed_batch, Block, ExecutorParameters, Hash, HeaderType, Namespace, ProposedBatch,
    RuntimeDescriptor, TxnSchedulerParameters,
};
use std::collections::HashMap;
use std::sync::Arc;

const ROUND_TIMEOUT: u64 = 10;
const PROPOSER_TIMEOUT: u64 = 5;

struct Harness {
    svc: Arc<RoothashService>,
    staking: Arc<InMemoryStaking>,
    tc: TestCommittee,
    ns: Namespace,
    height: u64,
}

impl Harness {
    fn new() -> Self {
        let staking = Arc::new(InMemoryStaking::new());
        let svc = Arc::new(RoothashService::new(
            ConsensusParameters::default(),
            staking.clone(),
        ));
        let ns = Namespace([42; 32]);
        svc.add_runtime(RuntimeDescriptor {
            id: ns,
            executor: ExecutorParameters {
                group_size: 2,
                group_backup_size: 1,
                max_messages: 32,
                round_timeout: ROUND_TIMEOUT,
            },
            txn_scheduler: TxnSchedulerParameters {
                proposer_timeout: PROPOSER_TIMEOUT,
                ..TxnSchedulerParameters::default()
            },
        })
        .expect("runtime registers");

        Self {
            svc,
            staking,
            tc: TestCommittee::generate(2, 1, 3),
            ns,
            height: 0,
        }
    }

    fn advance_epoch(&mut self, epoch: u64) {
        let mut committees = HashMap::new();
        committees.insert(self.ns, self.tc.committee.clone());
        self.svc.process_epoch_transition(epoch, &committees);
    }

    fn tick(&mut self, heights: u64) {
        for _ in 0..heights {
            self.height += 1;
            self.svc.process_height(self.height);
        }
    }

    fn latest(&self) -> Block {
        self.svc.get_latest_block(&self.ns).expect("runtime exists")
    }
}

#[tokio::test]
async fn test_consensus_parameters() {
    let h = Harness::new();
    assert_eq!(h.svc.consensus_parameters().max_runtime_messages, 32);
}

#[tokio::test]
async fn test_genesis_block() {
    let h = Harness::new();

    // The first delivered block is the genesis block.
    let mut sub = h.svc.watch_blocks(&h.ns).expect("subscription");
    let annotated = sub.recv().await.expect("genesis delivered");
    let header = &annotated.block.header;
    assert_eq!(header.version, 0);
    assert_eq!(header.round, 0);
    assert_eq!(header.header_type, HeaderType::Normal);
    assert!(header.io_root.is_empty());
    assert!(header.state_root.is_empty());

    assert_eq!(h.latest(), annotated.block);
    assert_eq!(
        h.svc.get_genesis_block(&h.ns).expect("genesis"),
        annotated.block
    );
}

#[tokio::test]
async fn test_epoch_transition_block() {
    let mut h = Harness::new();
    let genesis = h.latest();

    let mut sub = h.svc.watch_blocks(&h.ns).expect("subscription");
    h.tick(1);
    h.advance_epoch(1);

    // Skip the replayed genesis block, then expect the transition block.
    let first = sub.recv().await.expect("block");
    assert_eq!(first.block.header.round, 0);
    let transition = sub.recv().await.expect("block");
    let header = &transition.block.header;
    assert_eq!(header.header_type, HeaderType::EpochTransition);
    assert_eq!(header.round, 1);
    assert_eq!(header.previous_hash, genesis.header.encoded_hash());
    assert!(header.io_root.is_empty());
    assert_eq!(header.state_root, genesis.header.state_root);

    // The genesis block is still retrievable.
    assert_eq!(h.svc.get_genesis_block(&h.ns).expect("genesis"), genesis);
}

#[tokio::test]
async fn test_successful_round() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    let mut sub = h.svc.watch_blocks(&h.ns).expect("subscription");
    h.tick(1);

    // All primary workers commit to identical results over a single
    // transaction.
    let io_root = transaction_tree_root(&[(b"testInput", b"testOutput")]);
    let (header, commits) = generate_executor_commitments(&h.tc, h.ns, &child, io_root);
    h.svc
        .executor_commit(&h.ns, commits.clone())
        .expect("commitments accepted");

    // The replayed block is the child; the next one is the finalized
    // round.
    let replayed = sub.recv().await.expect("block");
    assert_eq!(replayed.block.header.round, child.header.round);
    let finalized = sub.recv().await.expect("block");
    let fh = &finalized.block.header;
    assert_eq!(fh.round, 2);
    assert_eq!(fh.header_type, HeaderType::Normal);
    assert_eq!(fh.previous_hash, child.header.encoded_hash());
    assert_eq!(fh.io_root, io_root);
    assert_eq!(fh.state_root, io_root);
    assert_eq!(fh.round, header.round);

    // The finalized event lists every primary worker as good; the
    // commitment events follow.
    let events = h.svc.events_at(finalized.height);
    assert_eq!(events.len(), commits.len() + 1);
    match &events[0] {
        Event::Finalized(ev) => {
            assert_eq!(ev.round, 2);
            assert!(ev.bad_compute_nodes.is_empty());
            assert_eq!(ev.good_compute_nodes.len(), h.tc.workers.len());
            for worker in &h.tc.workers {
                assert!(ev.good_compute_nodes.contains(&worker.public_key()));
            }
        }
        other => panic!("first event should be the finalization, got {other:?}"),
    }
    for (event, commit) in events[1..].iter().zip(commits.iter()) {
        match event {
            Event::ExecutorCommitted(ev) => assert_eq!(&ev.commit, commit),
            other => panic!("expected commitment event, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_round_timeout() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    // Only a single commitment is submitted, so the round cannot
    // finalize.
    let io_root = transaction_tree_root(&[(b"testInput", b"testOutput")]);
    let (_, commits) = generate_executor_commitments(&h.tc, h.ns, &child, io_root);
    h.svc
        .executor_commit(&h.ns, commits[..1].to_vec())
        .expect("commitment accepted");

    // Wait out 2.5x the round timeout: the first deadline forces
    // discrepancy resolution, the second fails the round.
    h.tick(ROUND_TIMEOUT * 5 / 2);

    let block = h.latest();
    assert_eq!(block.header.round, child.header.round + 1);
    assert_eq!(block.header.header_type, HeaderType::RoundFailed);
    assert!(block.header.io_root.is_empty());
    assert_eq!(block.header.state_root, child.header.state_root);

    // The discrepancy was surfaced on the way.
    let discrepancy_seen = (0..=h.height)
        .flat_map(|height| h.svc.events_at(height))
        .any(|e| matches!(e, Event::DiscrepancyDetected(_)));
    assert!(discrepancy_seen);
}

#[tokio::test]
async fn test_round_timeout_with_epoch_transition() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    let io_root = transaction_tree_root(&[(b"testInput", b"testOutput")]);
    let (_, commits) = generate_executor_commitments(&h.tc, h.ns, &child, io_root);
    h.svc
        .executor_commit(&h.ns, commits[..1].to_vec())
        .expect("commitment accepted");

    // Half a timeout in, an epoch transition arrives. It must supersede
    // the armed timeout.
    h.tick(ROUND_TIMEOUT / 2);
    h.advance_epoch(2);

    let block = h.latest();
    assert_eq!(block.header.round, child.header.round + 1);
    assert_eq!(block.header.header_type, HeaderType::EpochTransition);

    // The old timeout never fires.
    h.tick(ROUND_TIMEOUT * 3);
    assert_eq!(h.latest().header.round, child.header.round + 1);
}

#[tokio::test]
async fn test_proposer_timeout() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    // Wait until the proposer timeout is allowed.
    h.tick(PROPOSER_TIMEOUT);

    // A worker that is not the round's scheduler requests the timeout.
    let scheduler_key = h.tc.scheduler_for(child.header.round).public_key();
    let requester = h
        .tc
        .workers
        .iter()
        .find(|w| w.public_key() != scheduler_key)
        .expect("non-scheduler worker");
    h.svc
        .request_proposer_timeout(&h.ns, requester.public_key(), child.header.round)
        .expect("proposer timeout accepted");

    let block = h.latest();
    assert_eq!(block.header.round, child.header.round + 1);
    assert_eq!(block.header.header_type, HeaderType::RoundFailed);
}

#[tokio::test]
async fn test_equivocation_evidence() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    // The misbehaving node's entity holds 100 in escrow.
    let offender = &h.tc.workers[0];
    h.staking.add_escrow(offender.public_key(), 100);

    // Two batches signed by the same node over the same header, differing
    // only in the I/O root.
    let batch_a = sign_proposed_batch(
        offender,
        &h.ns,
        ProposedBatch {
            io_root: child.header.io_root,
            storage_signatures: Vec::new(),
            header: child.header.clone(),
        },
    );
    let batch_b = sign_proposed_batch(
        offender,
        &h.ns,
        ProposedBatch {
            io_root: Hash::digest_bytes(b"different root"),
            storage_signatures: Vec::new(),
            header: child.header.clone(),
        },
    );

    let slashed = h
        .svc
        .submit_equivocation_evidence(&h.ns, batch_a, batch_b)
        .await
        .expect("evidence accepted");
    assert_eq!(slashed, 100);

    // The full escrow was taken and credited to the runtime account.
    let events = h.staking.take_escrow_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].owner, offender.public_key());
    assert_eq!(events[0].amount, 100);
    assert_eq!(h.staking.escrow_balance(&offender.public_key()), 0);
    assert_eq!(h.staking.runtime_balance(&h.ns), 100);
}

#[tokio::test]
async fn test_non_conflicting_evidence_rejected() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    let offender = &h.tc.workers[0];
    let batch = sign_proposed_batch(
        offender,
        &h.ns,
        ProposedBatch {
            io_root: child.header.io_root,
            storage_signatures: Vec::new(),
            header: child.header.clone(),
        },
    );

    let result = h
        .svc
        .submit_equivocation_evidence(&h.ns, batch.clone(), batch)
        .await;
    assert!(result.is_err());
    assert!(h.staking.take_escrow_events().is_empty());
}

#[tokio::test]
async fn test_discrepancy_resolved_by_backups() {
    let mut h = Harness::new();
    h.tick(1);
    h.advance_epoch(1);
    let child = h.latest();

    // The two primaries disagree.
    let io_a = transaction_tree_root(&[(b"in", b"outA")]);
    let io_b = transaction_tree_root(&[(b"in", b"outB")]);
    let (_, commits_a) = generate_executor_commitments(&h.tc, h.ns, &child, io_a);
    let (_, commits_b) = generate_executor_commitments(&h.tc, h.ns, &child, io_b);
    h.tick(1);
    h.svc
        .executor_commit(&h.ns, vec![commits_a[0].clone()])
        .expect("first commitment");
    h.svc
        .executor_commit(&h.ns, vec![commits_b[1].clone()])
        .expect("second commitment");

    // Disagreement is detected as soon as all primaries have committed.
    let discrepancy_seen = h
        .svc
        .events_at(h.height)
        .iter()
        .any(|e| matches!(e, Event::DiscrepancyDetected(_)));
    assert!(discrepancy_seen);

    // The backup worker resolves the round in favour of result A.
    let backup = &h.tc.backups[0];
    let dispatch = sign_proposed_batch(
        h.tc.scheduler_for(child.header.round),
        &h.ns,
        ProposedBatch {
            io_root: Hash::EMPTY,
            storage_signatures: Vec::new(),
            header: child.header.clone(),
        },
    );
    let backup_commit = shared_types::sign_executor_commitment(
        backup,
        &h.ns,
        shared_types::ComputeBody {
            header: commits_a[0].body.header.clone(),
            storage_signatures: commits_a[0].body.storage_signatures.clone(),
            input_root: Hash::EMPTY,
            input_storage_signatures: Vec::new(),
            txn_scheduler_signature: dispatch.signature,
            rak_signature: Default::default(),
        },
    );
    h.svc
        .executor_commit(&h.ns, vec![backup_commit])
        .expect("backup commitment");

    let block = h.latest();
    assert_eq!(block.header.round, child.header.round + 1);
    assert_eq!(block.header.header_type, HeaderType::Normal);
    assert_eq!(block.header.io_root, io_a);

    // The diverging primary is reported as bad.
    let finalized = h
        .svc
        .events_at(h.height)
        .into_iter()
        .find_map(|e| match e {
            Event::Finalized(ev) => Some(ev),
            _ => None,
        })
        .expect("finalized event");
    assert!(finalized
        .bad_compute_nodes
        .contains(&h.tc.workers[1].public_key()));
    assert!(finalized
        .good_compute_nodes
        .contains(&h.tc.backups[0].public_key()));
}
