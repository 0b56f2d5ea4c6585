//! Transaction pool service.
//!
//! Orchestrates the seen cache, check queue and scheduling queue, and runs
//! the four worker loops:
//!
//! - **check**: batches pending transactions through the runtime's checks
//!   and schedules the survivors;
//! - **republish**: periodically re-publishes scheduled transactions that
//!   have not been seen on the network recently;
//! - **recheck**: re-submits every scheduled transaction for checking so
//!   stale transactions fall out of the queue;
//! - **flush**: forces underfull batches out on the flush timeout.
//!
//! Locking: every scheduler access goes through `scheduler_lock` and the
//! lock is released before any external call; `block_info` has its own
//! lock. Shutdown preempts every wait.

use crate::config::Config;
use crate::domain::block_info::BlockInfo;
use crate::domain::check_queue::CheckQueue;
use crate::domain::errors::TxPoolError;
use crate::domain::schedule_queue::{new_scheduler, SchedulerAlgorithm};
use crate::domain::seen_cache::SeenCache;
use crate::domain::transaction::{
    CheckTxResult, CheckedTransaction, PendingTx, TransactionMeta, TxWeight,
};
use crate::metrics::Metrics;
use crate::ports::{CheckTxHost, RuntimeHostProvisioner, TransactionPublisher};
use parking_lot::Mutex;
use shared_bus::{Broker, Nudge, Subscription};
use shared_types::{Hash, HeaderType, Namespace};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const REPUBLISH_DEBOUNCE: Duration = Duration::from_secs(10);

/// The transaction pool for one runtime.
///
/// Cheap to clone; all clones share the same pool.
#[derive(Clone)]
pub struct TxPool {
    inner: Arc<Inner>,
}

struct SchedulerState {
    scheduler: Option<Box<dyn SchedulerAlgorithm>>,
    round_weight_limits: BTreeMap<TxWeight, u64>,
}

struct BlockInfoState {
    info: Option<BlockInfo>,
    last_recheck_round: u64,
}

struct Inner {
    runtime_id: Namespace,
    cfg: Config,
    host: Arc<dyn RuntimeHostProvisioner>,
    publisher: Arc<dyn TransactionPublisher>,

    seen_cache: SeenCache,
    check_queue: CheckQueue,
    scheduler: Mutex<SchedulerState>,
    block_info: Mutex<BlockInfoState>,

    check_nudge: Nudge,
    recheck_nudge: Nudge,
    republish_nudge: Nudge,
    epoch_nudge: Nudge,

    scheduler_notifier: Broker<bool>,
    checked_tx_notifier: Broker<Vec<CheckedTransaction>>,

    init_tx: watch::Sender<bool>,
    init_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    flush_interval_tx: watch::Sender<Duration>,
    flush_interval_rx: watch::Receiver<Duration>,

    metrics: Metrics,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

enum SubmitOutcome {
    /// Recently seen; suppressed with no effect.
    Seen,
    /// Queued for checking.
    Queued,
}

impl TxPool {
    /// Create a new transaction pool.
    pub fn new(
        runtime_id: Namespace,
        cfg: Config,
        host: Arc<dyn RuntimeHostProvisioner>,
        publisher: Arc<dyn TransactionPublisher>,
    ) -> Self {
        let (init_tx, init_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Placeholder until the first scheduler update installs the
        // runtime's flush timeout.
        let (flush_interval_tx, flush_interval_rx) = watch::channel(Duration::from_secs(3600));
        Self {
            inner: Arc::new(Inner {
                runtime_id,
                seen_cache: SeenCache::new(cfg.max_last_seen_cache_size),
                check_queue: CheckQueue::new(cfg.max_pool_size, cfg.max_check_tx_batch_size),
                cfg,
                host,
                publisher,
                scheduler: Mutex::new(SchedulerState {
                    scheduler: None,
                    round_weight_limits: BTreeMap::new(),
                }),
                block_info: Mutex::new(BlockInfoState {
                    info: None,
                    last_recheck_round: 0,
                }),
                check_nudge: Nudge::new(),
                recheck_nudge: Nudge::new(),
                republish_nudge: Nudge::new(),
                epoch_nudge: Nudge::new(),
                scheduler_notifier: Broker::new(),
                checked_tx_notifier: Broker::new(),
                init_tx,
                init_rx,
                shutdown_tx,
                shutdown_rx,
                flush_interval_tx,
                flush_interval_rx,
                metrics: Metrics::new(),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Start the worker loops.
    pub fn start(&self) {
        info!(runtime = %self.inner.runtime_id, "starting transaction pool");
        let mut workers = self.inner.workers.lock();
        workers.push(tokio::spawn(check_worker(self.inner.clone())));
        workers.push(tokio::spawn(republish_worker(self.inner.clone())));
        workers.push(tokio::spawn(recheck_worker(self.inner.clone())));
        workers.push(tokio::spawn(flush_worker(self.inner.clone())));
    }

    /// Signal shutdown and wait for the worker loops to finish.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.workers.lock());
        for handle in workers {
            let _ = handle.await;
        }
    }

    /// Submit a transaction and wait for its check result.
    ///
    /// A fingerprint in the seen cache (and not a recheck) resolves
    /// immediately with a successful no-effect result.
    pub async fn submit_tx(
        &self,
        raw: Vec<u8>,
        meta: TransactionMeta,
    ) -> Result<CheckTxResult, TxPoolError> {
        let (notify_tx, notify_rx) = oneshot::channel();
        match self.inner.submit(raw, meta, Some(notify_tx))? {
            SubmitOutcome::Seen => return Ok(CheckTxResult::success()),
            SubmitOutcome::Queued => {}
        }
        let mut shutdown = self.inner.shutdown_rx.clone();
        tokio::select! {
            _ = shutdown.changed() => Err(TxPoolError::ShuttingDown),
            res = notify_rx => res.map_err(|_| TxPoolError::ShuttingDown),
        }
    }

    /// Submit a transaction without waiting for its check result.
    ///
    /// A duplicate submission is treated as success.
    pub fn submit_tx_no_wait(
        &self,
        raw: Vec<u8>,
        meta: TransactionMeta,
    ) -> Result<(), TxPoolError> {
        match self.inner.submit(raw, meta, None) {
            Ok(_) | Err(TxPoolError::Duplicate(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Remove a transaction batch from the scheduling queue.
    pub fn remove_tx_batch(&self, hashes: &[Hash]) {
        self.inner.remove_tx_batch(hashes);
    }

    /// A batch of transactions ready for scheduling.
    pub fn get_scheduled_batch(&self, force: bool) -> Vec<CheckedTransaction> {
        let mut state = self.inner.scheduler.lock();
        match state.scheduler.as_mut() {
            Some(sched) => sched.get_batch(force),
            None => Vec::new(),
        }
    }

    /// Look up known transactions; missing entries are `None` and mapped
    /// to their input index.
    pub fn get_known_batch(
        &self,
        hashes: &[Hash],
    ) -> (Vec<Option<CheckedTransaction>>, HashMap<Hash, usize>) {
        let state = self.inner.scheduler.lock();
        match state.scheduler.as_ref() {
            Some(sched) => sched.get_known_batch(hashes),
            None => {
                let missing: HashMap<Hash, usize> =
                    hashes.iter().enumerate().map(|(i, h)| (*h, i)).collect();
                (vec![None; hashes.len()], missing)
            }
        }
    }

    /// Update the pool's view of the latest runtime block.
    pub fn process_block(&self, bi: BlockInfo) -> Result<(), TxPoolError> {
        let mut state = self.inner.block_info.lock();
        let first_block = state.info.is_none();
        if first_block || bi.runtime_block.header.header_type == HeaderType::EpochTransition {
            self.inner.update_scheduler(&bi)?;
            self.inner.epoch_nudge.signal();
        }

        let round = bi.runtime_block.header.round;
        state.info = Some(bi);

        if round.saturating_sub(state.last_recheck_round) > self.inner.cfg.recheck_interval {
            self.inner.recheck_nudge.signal();
            state.last_recheck_round = round;
        }
        Ok(())
    }

    /// Replace the custom per-batch weight limits. Non-custom limits are
    /// preserved. No-op before scheduler initialization.
    pub fn update_weight_limits(
        &self,
        limits: BTreeMap<TxWeight, u64>,
    ) -> Result<(), TxPoolError> {
        let mut guard = self.inner.scheduler.lock();
        let state = &mut *guard;
        let Some(sched) = state.scheduler.as_mut() else {
            return Ok(());
        };

        // Drop custom weights that no longer exist, then apply the update.
        state
            .round_weight_limits
            .retain(|w, _| !w.is_custom() || limits.contains_key(w));
        for (w, l) in limits {
            state.round_weight_limits.insert(w, l);
        }

        let name = sched.name().to_string();
        sched.update_parameters(&name, &state.round_weight_limits)?;
        debug!(weight_limits = ?state.round_weight_limits, "updated round batch weight limits");
        Ok(())
    }

    /// Explicitly notify subscribers that they should attempt scheduling.
    pub fn wakeup_scheduler(&self) {
        self.inner.scheduler_notifier.broadcast(false);
    }

    /// Clear the scheduling queue and the seen cache.
    pub fn clear(&self) {
        let mut state = self.inner.scheduler.lock();
        if let Some(sched) = state.scheduler.as_mut() {
            sched.clear();
        }
        drop(state);
        self.inner.seen_cache.clear();
        self.inner.metrics.set_pending_schedule(0);
    }

    /// Subscribe to scheduling notifications. The flag indicates whether
    /// the batch flush timeout expired.
    pub fn watch_scheduler(&self) -> Subscription<bool> {
        self.inner.scheduler_notifier.subscribe()
    }

    /// Subscribe to newly checked transactions.
    pub fn watch_checked_transactions(&self) -> Subscription<Vec<CheckedTransaction>> {
        self.inner.checked_tx_notifier.subscribe()
    }

    /// Number of transactions pending checks.
    pub fn pending_check_size(&self) -> u64 {
        self.inner.check_queue.size()
    }

    /// Number of transactions pending scheduling.
    pub fn pending_schedule_size(&self) -> u64 {
        self.inner.pending_schedule_size()
    }
}

impl Inner {
    fn submit(
        &self,
        raw: Vec<u8>,
        meta: TransactionMeta,
        notify: Option<oneshot::Sender<CheckTxResult>>,
    ) -> Result<SubmitOutcome, TxPoolError> {
        // Skip recently seen transactions.
        let hash = Hash::digest_bytes(&raw);
        if !meta.recheck && self.seen_cache.peek(&hash).is_some() {
            debug!(tx = %hash, "ignoring already seen transaction");
            return Ok(SubmitOutcome::Seen);
        }

        let pending = Arc::new(PendingTx::new(raw, meta, notify));
        debug!(tx = %hash, recheck = meta.recheck, "queuing transaction for check");
        if let Err(err) = self.check_queue.add(pending) {
            warn!(tx = %hash, %err, "unable to queue transaction");
            return Err(err);
        }

        // Wake up the check batcher.
        self.check_nudge.signal();
        self.metrics.set_pending_check(self.check_queue.size());
        Ok(SubmitOutcome::Queued)
    }

    fn remove_tx_batch(&self, hashes: &[Hash]) {
        let mut state = self.scheduler.lock();
        if let Some(sched) = state.scheduler.as_mut() {
            sched.remove_tx_batch(hashes);
            self.metrics.set_pending_schedule(sched.unscheduled_size());
        }
    }

    fn pending_schedule_size(&self) -> u64 {
        let state = self.scheduler.lock();
        state
            .scheduler
            .as_ref()
            .map(|s| s.unscheduled_size())
            .unwrap_or(0)
    }

    fn current_block_info(&self) -> Result<BlockInfo, TxPoolError> {
        self.block_info
            .lock()
            .info
            .clone()
            .ok_or(TxPoolError::NoCurrentBlock)
    }

    fn update_scheduler(&self, bi: &BlockInfo) -> Result<(), TxPoolError> {
        let mut guard = self.scheduler.lock();
        let state = &mut *guard;
        let descriptor = &bi.active_descriptor;

        // Update per-round weight limits from the active descriptor.
        state.round_weight_limits.insert(
            TxWeight::ConsensusMessages,
            descriptor.executor.max_messages as u64,
        );
        state.round_weight_limits.insert(
            TxWeight::SizeBytes,
            descriptor.txn_scheduler.max_batch_size_bytes,
        );
        state
            .round_weight_limits
            .insert(TxWeight::Count, descriptor.txn_scheduler.max_batch_size);

        match state.scheduler.as_mut() {
            None => {
                debug!(
                    algorithm = %descriptor.txn_scheduler.algorithm,
                    "initializing transaction scheduler"
                );
                let sched = new_scheduler(
                    self.cfg.max_pool_size,
                    &descriptor.txn_scheduler.algorithm,
                    &state.round_weight_limits,
                )?;
                state.scheduler = Some(sched);
                let _ = self.init_tx.send(true);
            }
            Some(sched) => {
                if descriptor.txn_scheduler.algorithm != sched.name() {
                    error!(
                        current = sched.name(),
                        requested = %descriptor.txn_scheduler.algorithm,
                        "attempted to update transaction scheduler algorithm"
                    );
                    return Err(TxPoolError::AlgorithmMismatch {
                        current: sched.name().to_string(),
                        requested: descriptor.txn_scheduler.algorithm.clone(),
                    });
                }
                let name = sched.name().to_string();
                sched.update_parameters(&name, &state.round_weight_limits)?;
            }
        }

        // Reset the flush ticker to the runtime's flush timeout.
        let _ = self
            .flush_interval_tx
            .send(descriptor.txn_scheduler.batch_flush_timeout);
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<(), TxPoolError> {
        let mut init = self.init_rx.clone();
        let mut shutdown = self.shutdown_rx.clone();
        tokio::select! {
            _ = shutdown.changed() => Err(TxPoolError::ShuttingDown),
            res = init.wait_for(|i| *i) => match res {
                Ok(_) => Ok(()),
                Err(_) => Err(TxPoolError::ShuttingDown),
            },
        }
    }

    /// Request a runtime check of the next queued batch; transactions that
    /// pass are queued for scheduling.
    async fn check_tx_batch(&self, host: &dyn CheckTxHost) {
        let batch = self.check_queue.get_batch();
        if batch.is_empty() {
            return;
        }

        let bi = match self.current_block_info() {
            Ok(bi) => bi,
            Err(err) => {
                warn!(%err, "failed to get current block info, unable to check transactions");
                return;
            }
        };

        let raw_batch: Vec<Vec<u8>> = batch.iter().map(|tx| tx.raw.clone()).collect();
        let results = match host
            .check_tx(
                &bi.runtime_block,
                &bi.consensus_block,
                bi.epoch,
                bi.active_descriptor.executor.max_messages,
                raw_batch,
            )
            .await
        {
            Ok(results) => results,
            Err(err) => {
                // The batch stays queued and will be retried.
                warn!(%err, "transaction batch check failed");
                return;
            }
        };
        if results.len() != batch.len() {
            error!(
                expected = batch.len(),
                got = results.len(),
                "runtime returned mismatched check result count"
            );
            return;
        }

        // The checked batch is done; remove it from the queue.
        self.check_queue.remove_batch(&batch);
        self.metrics.set_pending_check(self.check_queue.size());

        let mut txs = Vec::new();
        let mut is_local = Vec::new();
        let mut unschedule = Vec::new();
        for (item, result) in batch.iter().zip(results.iter()) {
            if !result.is_success() {
                debug!(
                    tx = %item.hash,
                    result = ?result.error,
                    recheck = item.meta.recheck,
                    "check tx failed"
                );
                // A failing recheck removes the transaction from the
                // scheduling queue.
                if item.meta.recheck {
                    unschedule.push(item.hash);
                }
                continue;
            }
            if item.meta.discard || item.meta.recheck {
                continue;
            }
            txs.push(result.to_checked_transaction(item.raw.clone()));
            is_local.push(item.meta.local);
        }
        self.metrics
            .record_checked(txs.len() as u64, unschedule.len() as u64);

        // Unschedule transactions whose recheck failed.
        self.remove_tx_batch(&unschedule);

        if txs.is_empty() {
            // Fire waiters for batches that produced nothing to schedule.
            for (item, result) in batch.iter().zip(results.iter()) {
                item.notify(result.clone());
            }
            return;
        }
        debug!(num_txs = txs.len(), "checked new transactions");

        // Queue for scheduling, publish local transactions, and record
        // fingerprints before waiters observe their results.
        for (tx, local) in txs.iter().zip(is_local.iter()) {
            {
                let mut state = self.scheduler.lock();
                // The scheduler exists as otherwise there would be no
                // current block info above.
                let Some(sched) = state.scheduler.as_mut() else {
                    continue;
                };
                if let Err(err) = sched.queue_tx(tx.clone()) {
                    warn!(tx = %tx.hash(), %err, "unable to schedule transaction");
                    continue;
                }
            }

            let mut published_at = None;
            if *local {
                match self.publisher.publish_tx(tx.raw()).await {
                    Ok(()) => published_at = Some(Instant::now()),
                    Err(err) => {
                        warn!(tx = %tx.hash(), %err, "failed to publish local transaction");
                        // Publication failed; make sure we retry early.
                        self.republish_nudge.signal();
                    }
                }
            }
            self.seen_cache.put(tx.hash(), published_at);
        }

        // Deliver check results in submission order.
        for (item, result) in batch.iter().zip(results.iter()) {
            item.notify(result.clone());
        }

        // Notify subscribers that new transactions are available.
        self.checked_tx_notifier.broadcast(txs);
        self.scheduler_notifier.broadcast(false);
        self.metrics.set_pending_schedule(self.pending_schedule_size());
    }
}

async fn check_worker(inner: Arc<Inner>) {
    debug!("starting transaction check worker");
    let mut shutdown = inner.shutdown_rx.clone();

    // Wait for the hosted runtime to be available.
    let host = tokio::select! {
        _ = shutdown.changed() => return,
        res = inner.host.wait_hosted_runtime() => match res {
            Ok(host) => host,
            Err(err) => {
                error!(%err, "failed waiting for hosted runtime to become available");
                return;
            }
        },
    };

    // Wait for initialization so the scheduler is available.
    if inner.ensure_initialized().await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = inner.check_nudge.notified() => {
                inner.check_tx_batch(host.as_ref()).await;
            }
        }
    }
}

async fn republish_worker(inner: Arc<Inner>) {
    // Respect the transport's minimum republish interval.
    let mut republish_interval = inner.cfg.republish_interval;
    let min_interval = inner.publisher.min_republish_interval();
    if republish_interval < min_interval {
        republish_interval = min_interval;
    }
    debug!(interval = ?republish_interval, "starting transaction republish worker");

    if inner.ensure_initialized().await.is_err() {
        return;
    }

    let mut shutdown = inner.shutdown_rx.clone();
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + republish_interval,
        republish_interval,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_republish = Instant::now()
        .checked_sub(REPUBLISH_DEBOUNCE)
        .unwrap_or_else(Instant::now);

    loop {
        let mut force = false;
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {},
            _ = inner.republish_nudge.notified() => {
                // Debounce explicit republish requests.
                let since = last_republish.elapsed();
                if since < REPUBLISH_DEBOUNCE {
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        _ = tokio::time::sleep(REPUBLISH_DEBOUNCE - since) => {},
                    }
                }
            }
            _ = inner.epoch_nudge.notified() => {
                // Force republish on epoch transitions.
                force = true;
            }
        }
        last_republish = Instant::now();

        let txs = {
            let state = inner.scheduler.lock();
            match state.scheduler.as_ref() {
                Some(sched) => sched.get_transactions(0),
                None => Vec::new(),
            }
        };
        if txs.is_empty() {
            continue;
        }

        let mut republished: u64 = 0;
        for tx in txs {
            // Skip transactions that were published recently.
            if !force {
                if let Some(Some(published_at)) = inner.seen_cache.peek(&tx.hash()) {
                    if published_at.elapsed() < republish_interval {
                        continue;
                    }
                }
            }

            match inner.publisher.publish_tx(tx.raw()).await {
                Ok(()) => {
                    inner.seen_cache.put(tx.hash(), Some(Instant::now()));
                    republished += 1;
                }
                Err(err) => {
                    warn!(tx = %tx.hash(), %err, "failed to publish transaction");
                    inner.republish_nudge.signal();
                    continue;
                }
            }

            if republished >= inner.cfg.max_republish_batch_size {
                // Cap reached; pick the rest up in the next cycle.
                inner.republish_nudge.signal();
                break;
            }
        }

        inner.metrics.record_republished(republished);
        debug!(num_txs = republished, "republished transactions");
    }
}

async fn recheck_worker(inner: Arc<Inner>) {
    if inner.ensure_initialized().await.is_err() {
        return;
    }
    let mut shutdown = inner.shutdown_rx.clone();

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = inner.recheck_nudge.notified() => {},
        }

        let txs = {
            let state = inner.scheduler.lock();
            match state.scheduler.as_ref() {
                Some(sched) => sched.get_transactions(0),
                None => Vec::new(),
            }
        };
        if txs.is_empty() {
            continue;
        }
        debug!(num_txs = txs.len(), "rechecking scheduled transactions");

        for tx in txs {
            let meta = TransactionMeta {
                recheck: true,
                ..TransactionMeta::default()
            };
            if let Err(err) = inner.submit(tx.raw().to_vec(), meta, None) {
                if !matches!(err, TxPoolError::Duplicate(_)) {
                    warn!(%err, "failed to submit transaction for recheck");
                }
            }
        }
    }
}

async fn flush_worker(inner: Arc<Inner>) {
    if inner.ensure_initialized().await.is_err() {
        return;
    }
    let mut shutdown = inner.shutdown_rx.clone();
    let mut interval_rx = inner.flush_interval_rx.clone();
    let mut period = *interval_rx.borrow();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                period = *interval_rx.borrow();
                ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            }
            _ = ticker.tick() => {
                inner.scheduler_notifier.broadcast(true);
            }
        }
    }
}
