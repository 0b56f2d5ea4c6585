//! Committee node controller.
//!
//! Consumes the runtime's event streams (epoch transitions, new blocks,
//! peer messages, discrepancy events) and drives one batch per round
//! through execution, storage commit and commitment publication.

use crate::config::Config;
use crate::error::CommitteeError;
use crate::metrics::Metrics;
use crate::ports::outbound::{
    BatchExecutionHost, CommitmentSubmitter, ComputedBatch, MergeDispatch, StorageClient,
};
use crate::state::{is_valid_transition, Batch, DispatchedBatch, NodeState, NodeStateName};
use parking_lot::Mutex;
use shared_bus::{Broker, Subscription};
use shared_crypto::{Signature, Signer};
use shared_types::{
    sign_proposed_batch, ApplyOp, Block, ComputeBody, EpochSnapshot, Hash, Namespace,
    ProposedBatch, Round, RootType, SignedProposedBatch,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A batch dispatch received from a peer.
#[derive(Clone, Debug)]
pub struct BatchDispatch {
    /// The raw transactions.
    pub batch: Batch,
    /// The transaction scheduler's signed envelope.
    pub dispatch: SignedProposedBatch,
}

/// A message delivered by the P2P transport.
#[derive(Clone, Debug)]
pub struct PeerMessage {
    /// Runtime the message belongs to; used as a namespace.
    pub runtime_id: Namespace,
    /// Optional batch dispatch payload.
    pub batch_dispatch: Option<BatchDispatch>,
}

struct CrossNode {
    state: NodeState,
    snapshot: Option<EpochSnapshot>,
    current_block: Option<Block>,
    batch_seq: u64,
}

struct Inner {
    runtime_id: Namespace,
    cfg: Config,
    identity: Arc<Signer>,
    host: Arc<dyn BatchExecutionHost>,
    storage: Arc<dyn StorageClient>,
    submitter: Arc<dyn CommitmentSubmitter>,
    merge: Option<Arc<dyn MergeDispatch>>,

    cross_node: Mutex<CrossNode>,
    done_tx: mpsc::UnboundedSender<(u64, Option<ComputedBatch>)>,
    done_rx: Mutex<Option<mpsc::UnboundedReceiver<(u64, Option<ComputedBatch>)>>>,
    state_notifier: Broker<NodeStateName>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Metrics,
}

/// A per-runtime committee worker.
#[derive(Clone)]
pub struct CommitteeNode {
    inner: Arc<Inner>,
}

impl CommitteeNode {
    /// Create a new committee node.
    pub fn new(
        runtime_id: Namespace,
        cfg: Config,
        identity: Arc<Signer>,
        host: Arc<dyn BatchExecutionHost>,
        storage: Arc<dyn StorageClient>,
        submitter: Arc<dyn CommitmentSubmitter>,
        merge: Option<Arc<dyn MergeDispatch>>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                runtime_id,
                cfg,
                identity,
                host,
                storage,
                submitter,
                merge,
                cross_node: Mutex::new(CrossNode {
                    state: NodeState::NotReady,
                    snapshot: None,
                    current_block: None,
                    batch_seq: 0,
                }),
                done_tx,
                done_rx: Mutex::new(Some(done_rx)),
                state_notifier: Broker::new(),
                shutdown_tx,
                shutdown_rx,
                workers: Mutex::new(Vec::new()),
                metrics: Metrics::new(),
            }),
        }
    }

    /// Start the controller loop.
    pub fn start(&self) {
        let Some(done_rx) = self.inner.done_rx.lock().take() else {
            warn!("committee node already started");
            return;
        };
        self.inner
            .workers
            .lock()
            .push(tokio::spawn(worker(self.inner.clone(), done_rx)));
    }

    /// Signal shutdown and wait for the controller loop to finish.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.workers.lock());
        for handle in workers {
            let _ = handle.await;
        }
    }

    /// The current state name.
    pub fn state_name(&self) -> NodeStateName {
        self.inner.cross_node.lock().state.name()
    }

    /// Subscribe to state transitions.
    pub fn watch_state_transitions(&self) -> Subscription<NodeStateName> {
        self.inner.state_notifier.subscribe()
    }

    /// Handle an epoch transition: compute members wait for batches,
    /// everyone else goes idle.
    pub fn handle_epoch_transition(&self, snapshot: EpochSnapshot) {
        let inner = &self.inner;
        let mut cross = inner.cross_node.lock();
        let ready = snapshot.is_compute_member();
        cross.snapshot = Some(snapshot);
        if ready {
            transition(inner, &mut cross, NodeState::WaitingForBatch);
        } else {
            transition(inner, &mut cross, NodeState::NotReady);
        }
    }

    /// Handle a new block before normal processing: any in-flight batch is
    /// aborted since its state may be invalid.
    pub fn handle_new_block_early(&self, _block: &Block) {
        let inner = &self.inner;
        let mut cross = inner.cross_node.lock();
        abort_batch(inner, &mut cross, CommitteeError::SeenNewerBlock);
    }

    /// Handle a new finalized block.
    pub fn handle_new_block(&self, block: &Block) {
        let inner = &self.inner;
        let mut cross = inner.cross_node.lock();
        cross.current_block = Some(block.clone());

        match &cross.state {
            NodeState::WaitingForBlock { header, .. } => {
                if block.header.mostly_equal(header) {
                    info!("received block needed for batch processing");
                    let NodeState::WaitingForBlock { pending, .. } =
                        std::mem::replace(&mut cross.state, NodeState::WaitingForBatch)
                    else {
                        unreachable!()
                    };
                    maybe_start_processing(inner, &mut cross, pending);
                } else if block.header.round >= header.round {
                    // The awaited block can never arrive now.
                    warn!(
                        current_round = block.header.round,
                        wait_round = header.round,
                        "seen newer block while waiting for block"
                    );
                    transition(inner, &mut cross, NodeState::WaitingForBatch);
                } else {
                    info!(
                        current_round = block.header.round,
                        wait_round = header.round,
                        "still waiting for block"
                    );
                }
            }
            NodeState::WaitingForEvent { .. } => {
                // Block finalized without the need for a backup worker.
                info!(round = block.header.round, "considering the round finalized");
                transition(inner, &mut cross, NodeState::WaitingForBatch);
            }
            NodeState::WaitingForFinalize { started_at } => {
                info!(round = block.header.round, "considering the round finalized");
                let elapsed_ms = started_at.elapsed().as_millis() as u64;
                inner.metrics.record_processing_time(elapsed_ms);
                transition(inner, &mut cross, NodeState::WaitingForBatch);
            }
            _ => {}
        }
    }

    /// Handle a message from a peer. Returns whether the message was
    /// consumed.
    pub fn handle_peer_message(&self, message: &PeerMessage) -> Result<bool, CommitteeError> {
        let Some(bd) = &message.batch_dispatch else {
            return Ok(false);
        };
        if message.runtime_id != self.inner.runtime_id {
            warn!(runtime = %message.runtime_id, "received batch dispatch for foreign runtime");
            return Err(CommitteeError::IncompatibleHeader);
        }

        let inner = &self.inner;
        let mut cross = inner.cross_node.lock();
        handle_external_batch(
            inner,
            &mut cross,
            DispatchedBatch {
                batch: bd.batch.clone(),
                dispatch: bd.dispatch.clone(),
            },
        )?;
        Ok(true)
    }

    /// Handle a batch assembled by the local node acting as the round's
    /// transaction scheduler. The dispatch envelope is signed locally.
    pub fn handle_batch_from_scheduler(
        &self,
        batch: Batch,
        io_root: Hash,
        input_storage_signatures: Vec<Signature>,
    ) -> Result<(), CommitteeError> {
        let inner = &self.inner;
        let mut cross = inner.cross_node.lock();
        if cross.state.name() != NodeStateName::WaitingForBatch {
            return Err(CommitteeError::IncorrectState);
        }
        let is_member = cross
            .snapshot
            .as_ref()
            .map(|s| s.is_compute_member())
            .unwrap_or(false);
        if !is_member {
            return Err(CommitteeError::IncorrectRole);
        }
        let Some(block) = cross.current_block.clone() else {
            return Err(CommitteeError::IncorrectState);
        };

        let dispatch = sign_proposed_batch(
            &inner.identity,
            &inner.runtime_id,
            ProposedBatch {
                io_root,
                storage_signatures: input_storage_signatures,
                header: block.header,
            },
        );
        maybe_start_processing(inner, &mut cross, DispatchedBatch { batch, dispatch });
        Ok(())
    }

    /// Handle a compute discrepancy event. A backup worker holding a batch
    /// starts processing it.
    pub fn handle_discrepancy_event(&self, round: Round) {
        let inner = &self.inner;
        let mut cross = inner.cross_node.lock();
        if !matches!(cross.state, NodeState::WaitingForEvent { .. }) {
            return;
        }

        warn!(round, "compute discrepancy detected");
        inner.metrics.record_discrepancy();

        let is_backup = cross
            .snapshot
            .as_ref()
            .map(|s| s.is_backup_worker())
            .unwrap_or(false);
        if !is_backup {
            return;
        }

        info!("backup worker activating and processing batch");
        let NodeState::WaitingForEvent { pending } =
            std::mem::replace(&mut cross.state, NodeState::WaitingForBatch)
        else {
            unreachable!()
        };
        start_processing_batch(inner, &mut cross, pending);
    }
}

fn transition(inner: &Inner, cross: &mut CrossNode, new: NodeState) {
    let from = cross.state.name();
    let to = new.name();
    if !is_valid_transition(from, to) {
        panic!("invalid state transition: {from} -> {to}");
    }
    info!(current_state = %from, new_state = %to, "state transition");
    cross.state = new;
    inner.state_notifier.broadcast(to);
}

fn handle_external_batch(
    inner: &Inner,
    cross: &mut CrossNode,
    pending: DispatchedBatch,
) -> Result<(), CommitteeError> {
    if cross.state.name() != NodeStateName::WaitingForBatch {
        return Err(CommitteeError::IncorrectState);
    }
    let is_member = cross
        .snapshot
        .as_ref()
        .map(|s| s.is_compute_member())
        .unwrap_or(false);
    if !is_member {
        error!("got external batch while in incorrect role");
        return Err(CommitteeError::IncorrectRole);
    }

    let header = pending.dispatch.batch.header.clone();
    match &cross.current_block {
        Some(block) if block.header.mostly_equal(&header) => {
            maybe_start_processing(inner, cross, pending);
            Ok(())
        }
        Some(block) if block.header.round >= header.round => {
            // Based on an older block; the batch can never be processed.
            warn!(
                current_round = block.header.round,
                batch_round = header.round,
                "got external batch based on incompatible header"
            );
            Err(CommitteeError::IncompatibleHeader)
        }
        _ => {
            // Wait for the block the batch is based on to arrive.
            transition(inner, cross, NodeState::WaitingForBlock { pending, header });
            Ok(())
        }
    }
}

fn maybe_start_processing(inner: &Inner, cross: &mut CrossNode, pending: DispatchedBatch) {
    let is_backup = cross
        .snapshot
        .as_ref()
        .map(|s| s.is_backup_worker())
        .unwrap_or(false);
    if is_backup {
        // Backup workers hold the batch until a discrepancy event.
        transition(inner, cross, NodeState::WaitingForEvent { pending });
    } else {
        start_processing_batch(inner, cross, pending);
    }
}

fn start_processing_batch(inner: &Inner, cross: &mut CrossNode, pending: DispatchedBatch) {
    let Some(block) = cross.current_block.clone() else {
        error!("attempted to start processing batch without a current block");
        return;
    };
    debug!(num_txs = pending.batch.len(), "processing batch");

    let cancel = CancellationToken::new();
    cross.batch_seq += 1;
    let seq = cross.batch_seq;
    transition(
        inner,
        cross,
        NodeState::ProcessingBatch {
            dispatch: pending.dispatch,
            cancel: cancel.clone(),
            seq,
            started_at: Instant::now(),
        },
    );

    // Execute on a separate task so the controller keeps consuming
    // blocks while the runtime works.
    let host = inner.host.clone();
    let done_tx = inner.done_tx.clone();
    let batch = pending.batch;
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            res = host.execute_batch(&block, batch) => match res {
                Ok(computed) => Some(computed),
                Err(err) => {
                    error!(%err, "error while processing batch in runtime");
                    None
                }
            },
        };
        let _ = done_tx.send((seq, result));
    });
}

fn abort_batch(inner: &Inner, cross: &mut CrossNode, reason: CommitteeError) {
    let NodeState::ProcessingBatch {
        cancel, started_at, ..
    } = &cross.state
    else {
        // Only an in-flight batch can be aborted.
        return;
    };
    warn!(%reason, "aborting batch");

    cancel.cancel();
    let started = *started_at;

    // Interrupt the worker so the next batch can start from a clean
    // state. Aborted transactions stay in the scheduling queue until a
    // recheck or an explicit removal reconciles them.
    let host = inner.host.clone();
    tokio::spawn(async move {
        host.interrupt_worker().await;
    });

    inner.metrics.record_aborted();
    transition(
        inner,
        cross,
        NodeState::WaitingForFinalize {
            started_at: started,
        },
    );
}

async fn worker(inner: Arc<Inner>, mut done_rx: mpsc::UnboundedReceiver<(u64, Option<ComputedBatch>)>) {
    info!(runtime = %inner.runtime_id, "starting committee node");
    let mut shutdown = inner.shutdown_rx.clone();

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            msg = done_rx.recv() => {
                let Some((seq, result)) = msg else { return };
                match result {
                    None => {
                        let mut cross = inner.cross_node.lock();
                        if matches!(&cross.state, NodeState::ProcessingBatch { seq: s, .. } if *s == seq) {
                            warn!("worker has aborted batch processing");
                            abort_batch(&inner, &mut cross, CommitteeError::WorkerAborted);
                        }
                    }
                    Some(computed) => {
                        info!("worker has finished processing a batch");
                        propose_batch(&inner, seq, computed).await;
                    }
                }
            }
        }
    }
}

/// Commit the results to storage, verify the receipt, sign and publish
/// the executor commitment. Any failure aborts the batch.
async fn propose_batch(inner: &Arc<Inner>, seq: u64, computed: ComputedBatch) {
    // Snapshot what the proposal needs; the lock is not held across the
    // storage and publish calls below.
    let (dispatch, block, snapshot) = {
        let cross = inner.cross_node.lock();
        let NodeState::ProcessingBatch {
            dispatch, seq: s, ..
        } = &cross.state
        else {
            return;
        };
        if *s != seq {
            return;
        }
        let (Some(block), Some(snapshot)) = (cross.current_block.clone(), cross.snapshot.clone())
        else {
            return;
        };
        (dispatch.clone(), block, snapshot)
    };

    let round = computed.header.round;
    debug!(round, "proposing batch");

    // Commit I/O and state write logs to storage. Order matters for
    // receipt verification.
    let ops = vec![
        ApplyOp {
            root_type: RootType::Io,
            src_round: round,
            src_root: Hash::EMPTY,
            dst_root: computed.header.io_root,
            write_log: computed.io_write_log.clone(),
        },
        ApplyOp {
            root_type: RootType::State,
            src_round: block.header.round,
            src_root: block.header.state_root,
            dst_root: computed.header.state_root,
            write_log: computed.state_write_log.clone(),
        },
    ];
    let applied = tokio::time::timeout(
        inner.cfg.storage_commit_timeout,
        inner.storage.apply_batch(inner.runtime_id, round, ops),
    )
    .await;
    let receipts = match applied {
        Err(_) => {
            error!("storage commit timed out");
            abort_in_flight(inner, seq, CommitteeError::StorageCommitTimeout);
            return;
        }
        Ok(Err(err)) => {
            error!(%err, "failed to apply to storage");
            abort_in_flight(inner, seq, err);
            return;
        }
        Ok(Ok(receipts)) if receipts.is_empty() => {
            error!("storage returned no receipts");
            abort_in_flight(
                inner,
                seq,
                CommitteeError::StorageFailed("no receipts returned".into()),
            );
            return;
        }
        Ok(Ok(receipts)) => receipts,
    };

    let mut body = ComputeBody {
        header: computed.header.clone(),
        storage_signatures: Vec::new(),
        input_root: dispatch.batch.io_root,
        input_storage_signatures: dispatch.batch.storage_signatures.clone(),
        txn_scheduler_signature: dispatch.signature,
        rak_signature: computed.rak_signature,
    };
    for receipt in &receipts {
        let check = receipt
            .verify()
            .and_then(|_| body.verify_storage_receipt(inner.runtime_id, &receipt.body));
        if let Err(err) = check {
            error!(%err, "failed to validate storage receipt");
            abort_in_flight(inner, seq, CommitteeError::StorageReceiptInvalid(err));
            return;
        }
    }
    // Only the signatures are attached, not the full receipts.
    body.storage_signatures = receipts.iter().map(|r| r.signature).collect();

    let commit = shared_types::sign_executor_commitment(&inner.identity, &inner.runtime_id, body);
    if let Err(err) = inner.submitter.publish_commitment(&commit).await {
        error!(%err, "failed to publish commitment");
        abort_in_flight(inner, seq, err);
        return;
    }

    {
        let mut cross = inner.cross_node.lock();
        if let NodeState::ProcessingBatch {
            seq: s, started_at, ..
        } = &cross.state
        {
            if *s == seq {
                let started = *started_at;
                inner.metrics.record_proposed();
                transition(
                    inner,
                    &mut cross,
                    NodeState::WaitingForFinalize {
                        started_at: started,
                    },
                );
            }
        }
    }

    // A node that also sits on the merge committee hands the commitment
    // over directly instead of round-tripping through the transport.
    if snapshot.is_merge_member() {
        match &inner.merge {
            Some(merge) => merge.commitment_ready(commit).await,
            None => error!("scheduler says we are a merge member, but we are not"),
        }
    }
}

fn abort_in_flight(inner: &Arc<Inner>, seq: u64, reason: CommitteeError) {
    let mut cross = inner.cross_node.lock();
    if matches!(&cross.state, NodeState::ProcessingBatch { seq: s, .. } if *s == seq) {
        abort_batch(inner, &mut cross, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared_types::receipt::sign_receipt;
    use shared_types::{
        Committee, CommitteeMember, ComputeResultsHeader, ExecutorCommitment, Receipt, Role,
    };
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    struct MockHost {
        hang: AtomicBool,
        interrupts: AtomicU64,
    }

    #[async_trait]
    impl BatchExecutionHost for MockHost {
        async fn execute_batch(
            &self,
            block: &Block,
            batch: Batch,
        ) -> Result<ComputedBatch, CommitteeError> {
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
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

        async fn interrupt_worker(&self) {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockStorage {
        signer: Signer,
        hang: AtomicBool,
    }

    #[async_trait]
    impl StorageClient for MockStorage {
        async fn apply_batch(
            &self,
            namespace: Namespace,
            dst_round: Round,
            ops: Vec<ApplyOp>,
        ) -> Result<Vec<Receipt>, CommitteeError> {
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
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

    #[derive(Default)]
    struct MockSubmitter {
        commitments: Mutex<Vec<ExecutorCommitment>>,
    }

    #[async_trait]
    impl CommitmentSubmitter for MockSubmitter {
        async fn publish_commitment(
            &self,
            commit: &ExecutorCommitment,
        ) -> Result<(), CommitteeError> {
            self.commitments.lock().push(commit.clone());
            Ok(())
        }
    }

    struct Fixture {
        node: CommitteeNode,
        host: Arc<MockHost>,
        storage: Arc<MockStorage>,
        submitter: Arc<MockSubmitter>,
        identity: Arc<Signer>,
        scheduler: Arc<Signer>,
        namespace: Namespace,
    }

    fn fixture() -> Fixture {
        let namespace = Namespace([5; 32]);
        let identity = Arc::new(Signer::from_seed([1; 32]));
        let scheduler = Arc::new(Signer::from_seed([2; 32]));
        let host = Arc::new(MockHost {
            hang: AtomicBool::new(false),
            interrupts: AtomicU64::new(0),
        });
        let storage = Arc::new(MockStorage {
            signer: Signer::from_seed([9; 32]),
            hang: AtomicBool::new(false),
        });
        let submitter = Arc::new(MockSubmitter::default());
        let node = CommitteeNode::new(
            namespace,
            Config {
                storage_commit_timeout: Duration::from_millis(200),
            },
            identity.clone(),
            host.clone(),
            storage.clone(),
            submitter.clone(),
            None,
        );
        Fixture {
            node,
            host,
            storage,
            submitter,
            identity,
            scheduler,
            namespace,
        }
    }

    impl Fixture {
        /// Snapshot with the local node as the only (scheduler) worker.
        fn worker_snapshot(&self) -> EpochSnapshot {
            EpochSnapshot {
                epoch: 1,
                committee: Committee {
                    members: vec![CommitteeMember {
                        public_key: self.identity.public_key(),
                        role: Role::Worker,
                    }],
                },
                local: self.identity.public_key(),
                merge_member: false,
            }
        }

        /// Snapshot with the local node as backup and a foreign scheduler.
        fn backup_snapshot(&self) -> EpochSnapshot {
            EpochSnapshot {
                epoch: 1,
                committee: Committee {
                    members: vec![
                        CommitteeMember {
                            public_key: self.scheduler.public_key(),
                            role: Role::Worker,
                        },
                        CommitteeMember {
                            public_key: self.identity.public_key(),
                            role: Role::BackupWorker,
                        },
                    ],
                },
                local: self.identity.public_key(),
                merge_member: false,
            }
        }

        fn dispatch_for(&self, header: &shared_types::BlockHeader) -> BatchDispatch {
            BatchDispatch {
                batch: vec![b"tx".to_vec()],
                dispatch: sign_proposed_batch(
                    &self.scheduler,
                    &self.namespace,
                    ProposedBatch {
                        io_root: Hash::digest_bytes(b"input"),
                        storage_signatures: Vec::new(),
                        header: header.clone(),
                    },
                ),
            }
        }
    }

    async fn wait_state(node: &CommitteeNode, name: NodeStateName) {
        for _ in 0..200 {
            if node.state_name() == name {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "state {name} not reached in time (current: {})",
            node.state_name()
        );
    }

    #[tokio::test]
    async fn test_scheduler_batch_round_trip() {
        let f = fixture();
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        f.node.handle_epoch_transition(f.worker_snapshot());
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForBatch);
        f.node.handle_new_block(&genesis);

        let input_root = Hash::digest_bytes(b"input");
        f.node
            .handle_batch_from_scheduler(vec![b"tx".to_vec()], input_root, Vec::new())
            .unwrap();
        wait_state(&f.node, NodeStateName::WaitingForFinalize).await;

        // The published commitment carries the computed results and the
        // input the batch was dispatched under.
        let commits = f.submitter.commitments.lock();
        assert_eq!(commits.len(), 1);
        let commit = &commits[0];
        assert!(commit.verify(&f.namespace).is_ok());
        assert_eq!(commit.body.header.round, 1);
        assert_eq!(
            commit.body.header.previous_hash,
            genesis.header.encoded_hash()
        );
        assert_eq!(commit.body.input_root, input_root);
        assert!(!commit.body.storage_signatures.is_empty());
        drop(commits);

        // A new block finalizes the round.
        let next = Block::new_empty(&genesis, shared_types::HeaderType::Normal, 1);
        f.node.handle_new_block(&next);
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForBatch);

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_new_block_aborts_processing() {
        let f = fixture();
        f.host.hang.store(true, Ordering::SeqCst);
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        f.node.handle_epoch_transition(f.worker_snapshot());
        f.node.handle_new_block(&genesis);
        f.node
            .handle_batch_from_scheduler(vec![b"tx".to_vec()], Hash::EMPTY, Vec::new())
            .unwrap();
        assert_eq!(f.node.state_name(), NodeStateName::ProcessingBatch);

        f.node.handle_new_block_early(&genesis);
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForFinalize);
        assert!(f.submitter.commitments.lock().is_empty());

        // The runtime worker was interrupted.
        for _ in 0..100 {
            if f.host.interrupts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(f.host.interrupts.load(Ordering::SeqCst) > 0);

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_backup_waits_for_discrepancy_event() {
        let f = fixture();
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        f.node.handle_epoch_transition(f.backup_snapshot());
        f.node.handle_new_block(&genesis);

        let message = PeerMessage {
            runtime_id: f.namespace,
            batch_dispatch: Some(f.dispatch_for(&genesis.header)),
        };
        assert!(f.node.handle_peer_message(&message).unwrap());
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForEvent);

        // The discrepancy event activates the backup worker.
        f.node.handle_discrepancy_event(1);
        wait_state(&f.node, NodeStateName::WaitingForFinalize).await;
        assert_eq!(f.submitter.commitments.lock().len(), 1);

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_backup_round_finalized_without_event() {
        let f = fixture();
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        f.node.handle_epoch_transition(f.backup_snapshot());
        f.node.handle_new_block(&genesis);
        let message = PeerMessage {
            runtime_id: f.namespace,
            batch_dispatch: Some(f.dispatch_for(&genesis.header)),
        };
        f.node.handle_peer_message(&message).unwrap();
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForEvent);

        // The primaries agreed; the round finalized without us.
        let next = Block::new_empty(&genesis, shared_types::HeaderType::Normal, 1);
        f.node.handle_new_block(&next);
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForBatch);

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_batch_for_future_block_waits() {
        let f = fixture();
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        let future = Block::new_empty(&genesis, shared_types::HeaderType::Normal, 1);

        f.node.handle_epoch_transition(f.worker_snapshot());
        f.node.handle_new_block(&genesis);

        let message = PeerMessage {
            runtime_id: f.namespace,
            batch_dispatch: Some(f.dispatch_for(&future.header)),
        };
        f.node.handle_peer_message(&message).unwrap();
        assert_eq!(f.node.state_name(), NodeStateName::WaitingForBlock);

        // The awaited block arrives; processing starts.
        f.node.handle_new_block(&future);
        wait_state(&f.node, NodeStateName::WaitingForFinalize).await;

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_stale_batch_rejected() {
        let f = fixture();
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        let next = Block::new_empty(&genesis, shared_types::HeaderType::Normal, 1);

        f.node.handle_epoch_transition(f.worker_snapshot());
        f.node.handle_new_block(&next);

        // Batch based on the genesis block, which is already superseded.
        let message = PeerMessage {
            runtime_id: f.namespace,
            batch_dispatch: Some(f.dispatch_for(&genesis.header)),
        };
        assert_eq!(
            f.node.handle_peer_message(&message),
            Err(CommitteeError::IncompatibleHeader)
        );

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_foreign_runtime_message_rejected() {
        let f = fixture();
        let genesis = Block::new_genesis(f.namespace);
        let message = PeerMessage {
            runtime_id: Namespace([0xEE; 32]),
            batch_dispatch: Some(f.dispatch_for(&genesis.header)),
        };
        assert_eq!(
            f.node.handle_peer_message(&message),
            Err(CommitteeError::IncompatibleHeader)
        );
    }

    #[tokio::test]
    async fn test_non_member_cannot_receive_batch() {
        let f = fixture();
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        // Snapshot without the local node.
        f.node.handle_epoch_transition(EpochSnapshot {
            epoch: 1,
            committee: Committee {
                members: vec![CommitteeMember {
                    public_key: f.scheduler.public_key(),
                    role: Role::Worker,
                }],
            },
            local: f.identity.public_key(),
            merge_member: false,
        });
        assert_eq!(f.node.state_name(), NodeStateName::NotReady);
        f.node.handle_new_block(&genesis);

        let message = PeerMessage {
            runtime_id: f.namespace,
            batch_dispatch: Some(f.dispatch_for(&genesis.header)),
        };
        assert_eq!(
            f.node.handle_peer_message(&message),
            Err(CommitteeError::IncorrectState)
        );

        f.node.stop().await;
    }

    #[tokio::test]
    async fn test_storage_timeout_aborts_batch() {
        let f = fixture();
        f.storage.hang.store(true, Ordering::SeqCst);
        f.node.start();

        let genesis = Block::new_genesis(f.namespace);
        f.node.handle_epoch_transition(f.worker_snapshot());
        f.node.handle_new_block(&genesis);
        f.node
            .handle_batch_from_scheduler(vec![b"tx".to_vec()], Hash::EMPTY, Vec::new())
            .unwrap();

        wait_state(&f.node, NodeStateName::WaitingForFinalize).await;
        assert!(f.submitter.commitments.lock().is_empty());
        assert_eq!(f.node.inner.metrics.batches_aborted.load(Ordering::SeqCst), 1);

        f.node.stop().await;
    }
}
