//! Round state machine service.
//!
//! Owns the per-runtime chain state and is driven entirely by explicit
//! inputs from the consensus layer: height ticks, epoch transitions,
//! executor commitment transactions, proposer timeout requests and
//! equivocation evidence. Every state change that produces a block
//! appends it to the runtime's chain and streams it to subscribers.

use crate::domain::commitment_pool::{CommitmentPool, FinalizeOutcome};
use crate::error::RoothashError;
use crate::events::{
    AnnotatedEvent, DiscrepancyDetectedEvent, Event, ExecutorCommittedEvent, FinalizedEvent,
};
use crate::metrics::Metrics;
use crate::ports::StakingGateway;
use parking_lot::Mutex;
use shared_bus::{Broker, Subscription};
use shared_crypto::{PublicKey, Signature};
use shared_types::{
    AnnotatedBlock, Block, BlockHeader, Committee, ComputeResultsHeader, Epoch,
    ExecutorCommitment, HeaderType, Namespace, Round, RuntimeDescriptor, SignedProposedBatch,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Network-wide consensus parameters for the roothash service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusParameters {
    /// Maximum runtime messages a round may emit.
    pub max_runtime_messages: u32,
}

impl Default for ConsensusParameters {
    fn default() -> Self {
        Self {
            max_runtime_messages: 32,
        }
    }
}

struct RuntimeState {
    descriptor: RuntimeDescriptor,
    committee: Committee,
    genesis: Block,
    current: Block,
    history: Vec<AnnotatedBlock>,
    round_pool: CommitmentPool,
    /// Consensus height at which the current round opened.
    round_opened_at: u64,
    /// Armed round-timeout deadline, in consensus heights.
    timeout_deadline: Option<u64>,
    block_notifier: Broker<AnnotatedBlock>,
}

struct ServiceState {
    height: u64,
    runtimes: HashMap<Namespace, RuntimeState>,
    events: Vec<AnnotatedEvent>,
}

/// The roothash round state machine for all registered runtimes.
pub struct RoothashService {
    params: ConsensusParameters,
    staking: Arc<dyn StakingGateway>,
    state: Mutex<ServiceState>,
    metrics: Metrics,
}

impl RoothashService {
    /// Create a new service.
    pub fn new(params: ConsensusParameters, staking: Arc<dyn StakingGateway>) -> Self {
        Self {
            params,
            staking,
            state: Mutex::new(ServiceState {
                height: 0,
                runtimes: HashMap::new(),
                events: Vec::new(),
            }),
            metrics: Metrics::new(),
        }
    }

    /// The consensus parameters in force.
    pub fn consensus_parameters(&self) -> ConsensusParameters {
        self.params
    }

    /// The latest observed consensus height.
    pub fn current_height(&self) -> u64 {
        self.state.lock().height
    }

    /// Register a runtime and produce its genesis block at the current
    /// height.
    pub fn add_runtime(&self, descriptor: RuntimeDescriptor) -> Result<(), RoothashError> {
        let mut state = self.state.lock();
        let height = state.height;
        if state.runtimes.contains_key(&descriptor.id) {
            return Err(RoothashError::AlreadyRegistered(descriptor.id));
        }

        let genesis = Block::new_genesis(descriptor.id);
        let block_notifier = Broker::new_replay_last();
        let annotated = AnnotatedBlock {
            height,
            block: genesis.clone(),
        };
        block_notifier.broadcast(annotated.clone());
        info!(runtime = %descriptor.id, "registered runtime, genesis block produced");

        state.runtimes.insert(
            descriptor.id,
            RuntimeState {
                committee: Committee::default(),
                current: genesis.clone(),
                genesis,
                history: vec![annotated],
                round_pool: CommitmentPool::new(Committee::default(), 0),
                round_opened_at: height,
                timeout_deadline: None,
                block_notifier,
                descriptor,
            },
        );
        Ok(())
    }

    /// Advance the consensus height, firing any armed round timeouts.
    pub fn process_height(&self, height: u64) {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.height = height;

        for rt in state.runtimes.values_mut() {
            let Some(deadline) = rt.timeout_deadline else {
                continue;
            };
            if height < deadline {
                continue;
            }

            warn!(
                runtime = %rt.descriptor.id,
                round = rt.round_pool.round(),
                "round timeout expired"
            );
            let outcome = rt.round_pool.try_finalize(true);
            apply_outcome(&self.metrics, rt, height, &mut state.events, outcome);
        }
    }

    /// Process an executor-commit transaction carrying one or more
    /// commitments.
    pub fn executor_commit(
        &self,
        runtime: &Namespace,
        commits: Vec<ExecutorCommitment>,
    ) -> Result<(), RoothashError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let height = state.height;
        let rt = state
            .runtimes
            .get_mut(runtime)
            .ok_or(RoothashError::NoSuchRuntime(*runtime))?;

        for commit in commits {
            rt.round_pool
                .add_executor_commitment(runtime, &rt.current, commit.clone())?;
            state.events.push(AnnotatedEvent {
                height,
                event: Event::ExecutorCommitted(ExecutorCommittedEvent { commit }),
            });
        }

        // The first commitment opens the timeout window for the round.
        if rt.timeout_deadline.is_none() && !rt.round_pool.is_empty() {
            rt.timeout_deadline = Some(height + rt.descriptor.executor.round_timeout);
        }

        let outcome = rt.round_pool.try_finalize(false);
        apply_outcome(&self.metrics, rt, height, &mut state.events, outcome);
        Ok(())
    }

    /// Install new committees and emit an epoch-transition block for every
    /// registered runtime. Runtimes with no committee are suspended.
    pub fn process_epoch_transition(
        &self,
        epoch: Epoch,
        committees: &HashMap<Namespace, Committee>,
    ) {
        let mut state = self.state.lock();
        let state = &mut *state;
        let height = state.height;

        for rt in state.runtimes.values_mut() {
            match committees.get(&rt.descriptor.id) {
                Some(committee) if !committee.members.is_empty() => {
                    rt.committee = committee.clone();
                    debug!(
                        runtime = %rt.descriptor.id,
                        epoch,
                        members = committee.members.len(),
                        "epoch transition"
                    );
                    emit_empty_block(rt, height, HeaderType::EpochTransition);
                }
                _ => {
                    warn!(runtime = %rt.descriptor.id, epoch, "no committee elected, suspending");
                    rt.committee = Committee::default();
                    emit_empty_block(rt, height, HeaderType::Suspended);
                }
            }
        }
    }

    /// Process a proposer-timeout request from a committee member.
    ///
    /// Accepted only for the current round, from a worker that is not the
    /// round's designated scheduler, after the runtime's proposer timeout
    /// has elapsed since the round opened. Fails the round immediately.
    pub fn request_proposer_timeout(
        &self,
        runtime: &Namespace,
        signer: PublicKey,
        round: Round,
    ) -> Result<(), RoothashError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let height = state.height;
        let rt = state
            .runtimes
            .get_mut(runtime)
            .ok_or(RoothashError::NoSuchRuntime(*runtime))?;

        if round != rt.current.header.round {
            return Err(RoothashError::ProposerTimeoutNotAllowed(
                "request is not for the current round",
            ));
        }
        if !rt.committee.is_worker(&signer) {
            return Err(RoothashError::ProposerTimeoutNotAllowed(
                "submitter is not a committee worker",
            ));
        }
        let scheduler = rt
            .committee
            .transaction_scheduler(round)
            .ok_or(RoothashError::ProposerTimeoutNotAllowed("no committee"))?;
        if scheduler.public_key == signer {
            return Err(RoothashError::ProposerTimeoutNotAllowed(
                "scheduler cannot time itself out",
            ));
        }
        if height < rt.round_opened_at + rt.descriptor.txn_scheduler.proposer_timeout {
            return Err(RoothashError::ProposerTimeoutNotAllowed(
                "proposer timeout not yet allowed",
            ));
        }

        warn!(runtime = %rt.descriptor.id, round, "proposer timeout, failing round");
        emit_empty_block(rt, height, HeaderType::RoundFailed);
        self.metrics.record_round_failed();
        Ok(())
    }

    /// Process equivocation evidence: two validly signed proposed batches
    /// from the same signer over the same header with different I/O
    /// roots. Slashes the signer's entity and credits the runtime
    /// account. Returns the slashed amount.
    pub async fn submit_equivocation_evidence(
        &self,
        runtime: &Namespace,
        batch_a: SignedProposedBatch,
        batch_b: SignedProposedBatch,
    ) -> Result<u64, RoothashError> {
        {
            let state = self.state.lock();
            if !state.runtimes.contains_key(runtime) {
                return Err(RoothashError::NoSuchRuntime(*runtime));
            }
        }

        batch_a
            .verify(runtime)
            .map_err(|_| RoothashError::InvalidEvidence("batch A signature invalid"))?;
        batch_b
            .verify(runtime)
            .map_err(|_| RoothashError::InvalidEvidence("batch B signature invalid"))?;
        if batch_a.signature.public_key != batch_b.signature.public_key {
            return Err(RoothashError::InvalidEvidence("signers differ"));
        }
        if !batch_a.batch.header.mostly_equal(&batch_b.batch.header) {
            return Err(RoothashError::InvalidEvidence(
                "batches are not based on the same header",
            ));
        }
        if batch_a.batch.io_root == batch_b.batch.io_root {
            return Err(RoothashError::InvalidEvidence("batches do not conflict"));
        }

        let offender = batch_a.signature.public_key;
        let amount = self.staking.take_escrow(offender, *runtime).await?;
        self.metrics.record_slash();
        info!(
            runtime = %runtime,
            node = ?offender,
            amount,
            "slashed entity for proposed batch equivocation"
        );
        Ok(amount)
    }

    /// Subscribe to the runtime's finalized blocks. The latest block is
    /// replayed immediately; subsequent blocks arrive in strictly
    /// ascending round order.
    pub fn watch_blocks(
        &self,
        runtime: &Namespace,
    ) -> Result<Subscription<AnnotatedBlock>, RoothashError> {
        let state = self.state.lock();
        let rt = state
            .runtimes
            .get(runtime)
            .ok_or(RoothashError::NoSuchRuntime(*runtime))?;
        Ok(rt.block_notifier.subscribe())
    }

    /// The latest block of a runtime.
    pub fn get_latest_block(&self, runtime: &Namespace) -> Result<Block, RoothashError> {
        let state = self.state.lock();
        state
            .runtimes
            .get(runtime)
            .map(|rt| rt.current.clone())
            .ok_or(RoothashError::NoSuchRuntime(*runtime))
    }

    /// The genesis block of a runtime.
    pub fn get_genesis_block(&self, runtime: &Namespace) -> Result<Block, RoothashError> {
        let state = self.state.lock();
        state
            .runtimes
            .get(runtime)
            .map(|rt| rt.genesis.clone())
            .ok_or(RoothashError::NoSuchRuntime(*runtime))
    }

    /// Events recorded at a consensus height. Finalization events order
    /// before the commitments that produced them.
    pub fn events_at(&self, height: u64) -> Vec<Event> {
        let state = self.state.lock();
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.height == height)
            .map(|e| e.event.clone())
            .collect();
        events.sort_by_key(|e| match e {
            Event::Finalized(_) => 0,
            _ => 1,
        });
        events
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Append a block to the runtime's chain, notify subscribers and open the
/// next round.
fn push_block(rt: &mut RuntimeState, height: u64, block: Block) {
    rt.current = block.clone();
    let annotated = AnnotatedBlock { height, block };
    rt.history.push(annotated.clone());
    rt.block_notifier.broadcast(annotated);
    rt.round_pool = CommitmentPool::new(rt.committee.clone(), rt.current.header.round);
    rt.round_opened_at = height;
    rt.timeout_deadline = None;
}

/// Emit an empty successor block (round failure, epoch transition or
/// suspension): round advances, I/O root empty, state preserved.
fn emit_empty_block(rt: &mut RuntimeState, height: u64, header_type: HeaderType) {
    let block = Block::new_empty(&rt.current, header_type, unix_now());
    debug!(
        runtime = %rt.descriptor.id,
        round = block.header.round,
        ?header_type,
        "emitting empty block"
    );
    push_block(rt, height, block);
}

fn apply_outcome(
    metrics: &Metrics,
    rt: &mut RuntimeState,
    height: u64,
    events: &mut Vec<AnnotatedEvent>,
    outcome: FinalizeOutcome,
) {
    match outcome {
        FinalizeOutcome::Pending => {}
        FinalizeOutcome::Discrepancy => {
            warn!(
                runtime = %rt.descriptor.id,
                round = rt.round_pool.round(),
                "compute discrepancy detected"
            );
            events.push(AnnotatedEvent {
                height,
                event: Event::DiscrepancyDetected(DiscrepancyDetectedEvent {
                    round: rt.round_pool.round(),
                }),
            });
            metrics.record_discrepancy();
            // Give the backup workers a fresh timeout window.
            rt.timeout_deadline = Some(height + rt.descriptor.executor.round_timeout);
        }
        FinalizeOutcome::Failed => {
            emit_empty_block(rt, height, HeaderType::RoundFailed);
            metrics.record_round_failed();
        }
        FinalizeOutcome::Finalized {
            header,
            storage_signatures,
            good_compute_nodes,
            bad_compute_nodes,
        } => {
            finalize_round(
                metrics,
                rt,
                height,
                events,
                header,
                storage_signatures,
                good_compute_nodes,
                bad_compute_nodes,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn finalize_round(
    metrics: &Metrics,
    rt: &mut RuntimeState,
    height: u64,
    events: &mut Vec<AnnotatedEvent>,
    header: ComputeResultsHeader,
    storage_signatures: Vec<Signature>,
    good_compute_nodes: Vec<PublicKey>,
    bad_compute_nodes: Vec<PublicKey>,
) {
    let round = header.round;
    let block = Block {
        header: BlockHeader {
            version: rt.current.header.version,
            namespace: rt.current.header.namespace,
            round,
            timestamp: unix_now(),
            header_type: HeaderType::Normal,
            previous_hash: header.previous_hash,
            io_root: header.io_root,
            state_root: header.state_root,
            messages_hash: header.messages_hash,
            storage_signatures,
        },
    };
    info!(runtime = %rt.descriptor.id, round, "round finalized");
    push_block(rt, height, block);
    events.push(AnnotatedEvent {
        height,
        event: Event::Finalized(FinalizedEvent {
            round,
            good_compute_nodes,
            bad_compute_nodes,
        }),
    });
    metrics.record_block();
}
