//! The consumer side of a replication stream.

use crate::applier::OplogOperationApplier;
use crate::cancel::{CancellationToken, WAIT_SLICE};
use crate::config::ReplConfig;
use crate::context::ApplierContext;
use crate::error::{ApplyingError, ApplyingResult, ReplResult, ReplicationError, RollbackCause};
use crate::fetcher::{panic_message, FetcherHandle, FetcherStats, SyncFetcher};
use crate::source::OplogFetcher;
use crate::view::{FinishReason, SyncServiceView};
use parking_lot::{Condvar, Mutex, MutexGuard};
use replidb_core::Database;
use replidb_oplog::Operation;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How a replication stream ended, once everything delivered was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome {
    /// The fetch loop finished and every delivered operation was applied.
    Finished(FinishReason),
    /// The stream stopped on an unrecoverable error.
    Aborted(String),
    /// The source diverged; the replica must roll back before resuming.
    RollbackRequested(String),
}

impl ReplicationOutcome {
    /// Returns true for a clean finish.
    pub fn is_finished(&self) -> bool {
        matches!(self, ReplicationOutcome::Finished(_))
    }
}

impl fmt::Display for ReplicationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationOutcome::Finished(reason) => write!(f, "finished: {reason}"),
            ReplicationOutcome::Aborted(message) => write!(f, "aborted: {message}"),
            ReplicationOutcome::RollbackRequested(message) => {
                write!(f, "rollback requested: {message}")
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Operation>,
    in_flight: bool,
    failure: Option<ApplyingError>,
    paused: bool,
    /// No more deliveries will come; the applier drains and exits.
    closed: bool,
    applier_done: bool,
    applier_panicked: bool,
    outcome: Option<ReplicationOutcome>,
}

impl State {
    fn applier_status(&self) -> ReplResult<()> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone().into());
        }
        if self.applier_done {
            return Err(ReplicationError::stop("applier thread is gone"));
        }
        Ok(())
    }

    fn record(&mut self, outcome: ReplicationOutcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
        self.closed = true;
    }

    /// The outcome as seen by callers: only final once the applier is done,
    /// and an apply failure overrides a clean fetch finish.
    fn resolved(&self) -> Option<ReplicationOutcome> {
        if !self.applier_done {
            return None;
        }
        let outcome = self.outcome.clone()?;
        if !outcome.is_finished() {
            return Some(outcome);
        }
        if let Some(failure) = &self.failure {
            return Some(ReplicationOutcome::Aborted(failure.to_string()));
        }
        if self.applier_panicked {
            return Some(ReplicationOutcome::Aborted("applier thread panicked".to_string()));
        }
        Some(outcome)
    }
}

struct ServiceCore {
    name: String,
    capacity: usize,
    state: Mutex<State>,
    changed: Condvar,
    applied: AtomicU64,
}

impl ServiceCore {
    fn wait(&self, state: &mut MutexGuard<'_, State>, token: &CancellationToken) -> ReplResult<()> {
        token.check()?;
        self.changed.wait_for(state, WAIT_SLICE);
        Ok(())
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }
}

impl SyncServiceView for ServiceCore {
    fn deliver(&self, op: &Operation, token: &CancellationToken) -> ReplResult<()> {
        let mut state = self.state.lock();
        loop {
            state.applier_status()?;
            if state.queue.len() < self.capacity {
                state.queue.push_back(op.clone());
                self.changed.notify_all();
                return Ok(());
            }
            self.wait(&mut state, token)?;
        }
    }

    fn rollback(&self, cause: RollbackCause) {
        warn!(service = %self.name, cause = %cause, "rollback requested");
        self.state
            .lock()
            .record(ReplicationOutcome::RollbackRequested(cause.to_string()));
        self.changed.notify_all();
    }

    fn await_until_unpaused(&self, token: &CancellationToken) -> ReplResult<()> {
        let mut state = self.state.lock();
        while state.paused {
            self.wait(&mut state, token)?;
        }
        Ok(())
    }

    fn should_pause(&self) -> bool {
        self.state.lock().paused
    }

    fn await_until_all_fetched_are_applied(&self, token: &CancellationToken) -> ReplResult<()> {
        let mut state = self.state.lock();
        loop {
            state.applier_status()?;
            if state.queue.is_empty() && !state.in_flight {
                return Ok(());
            }
            self.wait(&mut state, token)?;
        }
    }

    fn fetch_finished(&self, reason: FinishReason) {
        info!(service = %self.name, reason = %reason, "fetch finished");
        self.state.lock().record(ReplicationOutcome::Finished(reason));
        self.changed.notify_all();
    }

    fn fetch_aborted(&self, error: ReplicationError) {
        error!(service = %self.name, error = %error, "replication aborted");
        self.state
            .lock()
            .record(ReplicationOutcome::Aborted(error.to_string()));
        self.changed.notify_all();
    }
}

/// Marks the applier as done even if it unwinds.
struct ApplierExit<'a>(&'a ServiceCore);

impl Drop for ApplierExit<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.applier_done = true;
        state.in_flight = false;
        state.applier_panicked = thread::panicking();
        drop(state);
        self.0.changed.notify_all();
    }
}

fn apply_loop(core: &ServiceCore, db: &Database, context: ApplierContext) {
    let _exit = ApplierExit(core);
    let applier = OplogOperationApplier::new();
    loop {
        let op = {
            let mut state = core.state.lock();
            loop {
                if state.failure.is_some() {
                    break None;
                }
                if let Some(op) = state.queue.pop_front() {
                    state.in_flight = true;
                    break Some(op);
                }
                if state.closed {
                    break None;
                }
                core.changed.wait(&mut state);
            }
        };
        let Some(op) = op else { break };

        let result = apply_one(&applier, db, &op, &context);
        let mut state = core.state.lock();
        state.in_flight = false;
        match result {
            Ok(()) => {
                core.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                error!(service = %core.name, op = %op, error = %err, "error while applying an oplog operation");
                state.failure = Some(err);
                state.queue.clear();
            }
        }
        drop(state);
        core.changed.notify_all();
    }
    debug!(service = %core.name, "applier stopped");
}

fn apply_one(
    applier: &OplogOperationApplier,
    db: &Database,
    op: &Operation,
    context: &ApplierContext,
) -> ApplyingResult<()> {
    let mut txn = db.begin_write();
    match applier.apply(op, &mut txn, context) {
        Ok(()) => {
            txn.commit()?;
            debug!(optime = %op.optime, hash = op.hash, "applied");
            Ok(())
        }
        Err(err) => {
            if let Err(abort_err) = txn.abort() {
                warn!(error = %abort_err, "failed to abort transaction");
            }
            Err(err)
        }
    }
}

/// Replicates a fetch source into a database.
///
/// Runs a [`SyncFetcher`] on one thread and an applier on another, joined
/// by a bounded FIFO queue. The applier applies each operation in its own
/// write transaction. The first apply failure stops the stream.
pub struct ReplicationService {
    core: Arc<ServiceCore>,
    token: CancellationToken,
    fetcher: Option<FetcherHandle>,
    applier: Option<JoinHandle<()>>,
}

impl ReplicationService {
    /// Starts replicating from `fetcher` into `db`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Stop`] if a worker thread cannot be
    /// spawned.
    pub fn start<F>(db: Arc<Database>, fetcher: F, config: ReplConfig) -> ReplResult<Self>
    where
        F: OplogFetcher + 'static,
    {
        let core = Arc::new(ServiceCore {
            name: config.service_name.clone(),
            capacity: config.queue_capacity.max(1),
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            applied: AtomicU64::new(0),
        });
        let token = CancellationToken::new();

        let applier = {
            let core = Arc::clone(&core);
            let context = config.applier_context();
            thread::Builder::new()
                .name(format!("{}-applier", config.service_name))
                .spawn(move || apply_loop(&core, &db, context))
                .map_err(|e| {
                    ReplicationError::stop(format!("failed to spawn applier thread: {e}"))
                })?
        };

        let view: Arc<dyn SyncServiceView> = core.clone();
        let fetcher = match SyncFetcher::new(view, fetcher)
            .with_config(&config)
            .with_token(token.clone())
            .spawn()
        {
            Ok(handle) => handle,
            Err(err) => {
                core.close();
                if applier.join().is_err() {
                    warn!(service = %config.service_name, "applier panicked during shutdown");
                }
                return Err(err);
            }
        };

        info!(
            service = %config.service_name,
            queue_capacity = core.capacity,
            treat_update_as_upsert = config.treat_update_as_upsert,
            "replication started"
        );
        Ok(Self {
            core,
            token,
            fetcher: Some(fetcher),
            applier: Some(applier),
        })
    }

    /// Pauses fetching. Operations already delivered are still applied.
    pub fn pause(&self) {
        self.core.state.lock().paused = true;
        self.core.changed.notify_all();
    }

    /// Resumes fetching.
    pub fn resume(&self) {
        self.core.state.lock().paused = false;
        self.core.changed.notify_all();
    }

    /// Returns true while paused.
    pub fn is_paused(&self) -> bool {
        self.core.state.lock().paused
    }

    /// Asks the stream to stop. Operations already delivered are applied
    /// before the applier exits.
    pub fn stop(&self) {
        self.token.cancel();
        self.core.changed.notify_all();
    }

    /// Number of operations applied so far.
    pub fn applied_count(&self) -> u64 {
        self.core.applied.load(Ordering::Relaxed)
    }

    /// Counters of the fetch loop.
    pub fn stats(&self) -> FetcherStats {
        self.fetcher
            .as_ref()
            .map(FetcherHandle::stats)
            .unwrap_or_default()
    }

    /// The apply failure that stopped the stream, if any.
    pub fn last_failure(&self) -> Option<ApplyingError> {
        self.core.state.lock().failure.clone()
    }

    /// Waits up to `timeout` for the stream to end.
    pub fn wait_for_outcome(&self, timeout: Duration) -> Option<ReplicationOutcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.core.state.lock();
        loop {
            if let Some(outcome) = state.resolved() {
                return Some(outcome);
            }
            if self.core.changed.wait_until(&mut state, deadline).timed_out() {
                return state.resolved();
            }
        }
    }

    /// Waits for both threads to end and returns the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Stop`] if a thread panicked outside the
    /// guarded sections or no outcome was recorded.
    pub fn join(mut self) -> ReplResult<ReplicationOutcome> {
        if let Some(fetcher) = self.fetcher.take() {
            let outcome = fetcher.join()?;
            debug!(service = %self.core.name, outcome = ?outcome, "fetcher joined");
        }
        // The view closes the queue on every terminal notification.
        self.core.close();
        if let Some(applier) = self.applier.take() {
            applier.join().map_err(|payload| {
                ReplicationError::stop(format!(
                    "applier thread panicked: {}",
                    panic_message(payload.as_ref())
                ))
            })?;
        }
        self.core
            .state
            .lock()
            .resolved()
            .ok_or_else(|| ReplicationError::stop("replication ended without an outcome"))
    }
}

impl Drop for ReplicationService {
    fn drop(&mut self) {
        if self.fetcher.is_some() || self.applier.is_some() {
            self.token.cancel();
            self.core.close();
        }
    }
}
