//! The fetch loop.
//!
//! A [`SyncFetcher`] repeatedly pulls batches from an [`OplogFetcher`] and
//! hands their operations, in order, to a [`SyncServiceView`]. Transient
//! failures restart the iteration; a rollback or a fatal error ends the
//! loop. Whatever happens, the view hears exactly one terminal
//! notification per run.

use crate::cancel::CancellationToken;
use crate::config::ReplConfig;
use crate::error::{ReplResult, ReplicationError, RollbackCause};
use crate::source::OplogFetcher;
use crate::view::{FinishReason, SyncServiceView};
use parking_lot::RwLock;
use replidb_oplog::Operation;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Counters kept by a fetch loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetcherStats {
    /// Non-terminal batches fetched.
    pub batches: u64,
    /// Operations handed to the view.
    pub operations_delivered: u64,
    /// Iterations restarted after a retryable failure.
    pub retries: u64,
    /// Idle sleeps because the source had nothing ready.
    pub idle_backoffs: u64,
}

/// How a fetch loop ended.
#[derive(Debug, Clone)]
pub enum FetcherOutcome {
    /// The loop ended without error.
    Finished(FinishReason),
    /// The source history diverged.
    RolledBack(RollbackCause),
    /// An unrecoverable error ended the loop.
    Aborted(ReplicationError),
}

impl FetcherOutcome {
    /// Returns true if the loop ended without error.
    pub fn is_finished(&self) -> bool {
        matches!(self, FetcherOutcome::Finished(_))
    }
}

enum Step {
    Continue,
    Exhausted,
}

/// Drives one replication stream from a fetch source to a view.
pub struct SyncFetcher<F> {
    name: String,
    view: Arc<dyn SyncServiceView>,
    fetcher: F,
    token: CancellationToken,
    idle_backoff: Duration,
    stats: Arc<RwLock<FetcherStats>>,
    /// Fetched operations not yet accepted by the view, in log order.
    pending: VecDeque<Operation>,
    pending_ready_for_more: bool,
}

impl<F: OplogFetcher> SyncFetcher<F> {
    /// Creates a fetch loop with the default configuration.
    pub fn new(view: Arc<dyn SyncServiceView>, fetcher: F) -> Self {
        let config = ReplConfig::default();
        Self {
            name: config.service_name,
            view,
            fetcher,
            token: CancellationToken::new(),
            idle_backoff: config.idle_backoff,
            stats: Arc::new(RwLock::new(FetcherStats::default())),
            pending: VecDeque::new(),
            pending_ready_for_more: true,
        }
    }

    /// Applies the name and idle backoff of `config`.
    pub fn with_config(mut self, config: &ReplConfig) -> Self {
        self.name = config.service_name.clone();
        self.idle_backoff = config.idle_backoff;
        self
    }

    /// Uses `token` as the stop signal.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Returns a clone of the stop signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> FetcherStats {
        self.stats.read().clone()
    }

    /// Runs the loop on the current thread until it ends, then notifies
    /// the view.
    pub fn run(mut self) -> FetcherOutcome {
        info!(fetcher = %self.name, "fetcher started");
        let outcome = self.fetch_loop();
        match &outcome {
            FetcherOutcome::RolledBack(cause) => {
                debug!(fetcher = %self.name, cause = %cause, "requesting rollback");
                self.view.rollback(cause.clone());
            }
            FetcherOutcome::Finished(reason) => {
                info!(fetcher = %self.name, reason = %reason, "fetch finished");
                self.view.fetch_finished(*reason);
            }
            FetcherOutcome::Aborted(err) => {
                info!(fetcher = %self.name, error = %err, "fetcher stopped by self request");
                self.view.fetch_aborted(err.clone());
            }
        }
        info!(fetcher = %self.name, "fetcher stopped");
        outcome
    }

    fn fetch_loop(&mut self) -> FetcherOutcome {
        loop {
            if self.token.is_cancelled() {
                return FetcherOutcome::Finished(FinishReason::StopRequested);
            }
            match panic::catch_unwind(AssertUnwindSafe(|| self.iterate())) {
                Ok(Ok(Step::Continue)) => {}
                Ok(Ok(Step::Exhausted)) => {
                    return FetcherOutcome::Finished(FinishReason::OplogExhausted)
                }
                Ok(Err(ReplicationError::Interrupted)) => {
                    info!(fetcher = %self.name, "restarting fetch process");
                }
                Ok(Err(ReplicationError::Retry { reason })) => {
                    info!(fetcher = %self.name, reason = %reason, "retrying fetch iteration");
                    self.stats.write().retries += 1;
                }
                Ok(Err(ReplicationError::Rollback(cause))) => {
                    return FetcherOutcome::RolledBack(cause)
                }
                Ok(Err(err @ ReplicationError::Stop { .. })) => {
                    return FetcherOutcome::Aborted(err)
                }
                Err(payload) => {
                    return FetcherOutcome::Aborted(ReplicationError::stop(format!(
                        "fetcher panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                }
            }
        }
    }

    fn iterate(&mut self) -> ReplResult<Step> {
        if self.view.should_pause() {
            debug!(fetcher = %self.name, "fetcher paused");
            self.view.await_until_unpaused(&self.token)?;
            return Ok(Step::Continue);
        }

        if self.pending.is_empty() {
            self.view.await_until_all_fetched_are_applied(&self.token)?;
            let batch = self.fetcher.fetch(&self.token)?;
            if batch.is_last_one() {
                return Ok(Step::Exhausted);
            }
            self.stats.write().batches += 1;
            trace!(fetcher = %self.name, size = batch.len(), "batch fetched");
            self.pending_ready_for_more = batch.is_ready_for_more();
            self.pending.extend(batch.into_operations());
        }

        // An operation leaves `pending` only once the view accepted it, so a
        // retried iteration resumes exactly where delivery failed.
        while let Some(op) = self.pending.front() {
            self.token.check()?;
            self.view.deliver(op, &self.token)?;
            self.pending.pop_front();
            self.stats.write().operations_delivered += 1;
        }

        if !self.pending_ready_for_more {
            // Consume the flag so a retry after an interrupted sleep fetches.
            self.pending_ready_for_more = true;
            warn!(fetcher = %self.name, "there is no source to sync from");
            self.stats.write().idle_backoffs += 1;
            self.token.sleep(self.idle_backoff)?;
        }
        Ok(Step::Continue)
    }
}

impl<F: OplogFetcher + 'static> SyncFetcher<F> {
    /// Runs the loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Stop`] if the thread cannot be spawned.
    pub fn spawn(self) -> ReplResult<FetcherHandle> {
        let token = self.token.clone();
        let stats = Arc::clone(&self.stats);
        let thread = thread::Builder::new()
            .name(format!("{}-fetcher", self.name))
            .spawn(move || self.run())
            .map_err(|e| ReplicationError::stop(format!("failed to spawn fetcher thread: {e}")))?;
        Ok(FetcherHandle {
            token,
            stats,
            thread,
        })
    }
}

/// Handle to a fetch loop running on its own thread.
pub struct FetcherHandle {
    token: CancellationToken,
    stats: Arc<RwLock<FetcherStats>>,
    thread: JoinHandle<FetcherOutcome>,
}

impl FetcherHandle {
    /// Asks the loop to stop. Blocking waits inside the loop wake up.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns true once the loop thread has ended.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Returns a snapshot of the loop's counters.
    pub fn stats(&self) -> FetcherStats {
        self.stats.read().clone()
    }

    /// Waits for the loop to end.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Stop`] if the loop thread panicked
    /// outside an iteration.
    pub fn join(self) -> ReplResult<FetcherOutcome> {
        self.thread.join().map_err(|payload| {
            ReplicationError::stop(format!(
                "fetcher thread panicked: {}",
                panic_message(payload.as_ref())
            ))
        })
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use replidb_oplog::{OpTime, OplogBatch};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        delivered: Mutex<Vec<OpTime>>,
        terminal: Mutex<Vec<String>>,
        fail_deliveries: AtomicUsize,
        pause: AtomicBool,
    }

    impl SyncServiceView for Recorder {
        fn deliver(&self, op: &Operation, _token: &CancellationToken) -> ReplResult<()> {
            let remaining = self.fail_deliveries.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_deliveries.store(remaining - 1, Ordering::SeqCst);
                return Err(ReplicationError::retry("view busy"));
            }
            self.delivered.lock().push(op.optime);
            Ok(())
        }

        fn rollback(&self, cause: RollbackCause) {
            self.terminal.lock().push(format!("rollback: {}", cause.reason));
        }

        fn await_until_unpaused(&self, token: &CancellationToken) -> ReplResult<()> {
            self.pause.store(false, Ordering::SeqCst);
            token.check()
        }

        fn should_pause(&self) -> bool {
            self.pause.load(Ordering::SeqCst)
        }

        fn await_until_all_fetched_are_applied(&self, token: &CancellationToken) -> ReplResult<()> {
            token.check()
        }

        fn fetch_finished(&self, reason: FinishReason) {
            self.terminal.lock().push(format!("finished: {reason}"));
        }

        fn fetch_aborted(&self, error: ReplicationError) {
            self.terminal.lock().push(format!("aborted: {error}"));
        }
    }

    struct Scripted(VecDeque<ReplResult<OplogBatch>>);

    impl OplogFetcher for Scripted {
        fn fetch(&mut self, _token: &CancellationToken) -> ReplResult<OplogBatch> {
            self.0.pop_front().unwrap_or_else(|| Ok(OplogBatch::last()))
        }
    }

    struct Panicking;

    impl OplogFetcher for Panicking {
        fn fetch(&mut self, _token: &CancellationToken) -> ReplResult<OplogBatch> {
            panic!("source exploded")
        }
    }

    fn batch(incs: &[u32], ready: bool) -> ReplResult<OplogBatch> {
        Ok(OplogBatch::new(
            incs.iter().map(|i| Operation::noop(OpTime::new(1, *i))).collect(),
            ready,
        ))
    }

    #[test]
    fn delivers_in_order_until_exhausted() {
        let view = Arc::new(Recorder::default());
        let fetcher = SyncFetcher::new(
            view.clone(),
            Scripted(VecDeque::from([batch(&[1, 2], true), batch(&[3], true)])),
        );
        let outcome = fetcher.run();

        assert!(outcome.is_finished());
        assert_eq!(
            *view.delivered.lock(),
            vec![OpTime::new(1, 1), OpTime::new(1, 2), OpTime::new(1, 3)]
        );
        assert_eq!(*view.terminal.lock(), vec!["finished: remote oplog finished"]);
    }

    #[test]
    fn retried_delivery_resumes_in_place() {
        let view = Arc::new(Recorder::default());
        view.fail_deliveries.store(2, Ordering::SeqCst);
        let fetcher = SyncFetcher::new(view.clone(), Scripted(VecDeque::from([batch(&[1, 2], true)])));
        let stats = Arc::clone(&fetcher.stats);
        fetcher.run();

        assert_eq!(*view.delivered.lock(), vec![OpTime::new(1, 1), OpTime::new(1, 2)]);
        let stats = stats.read().clone();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.operations_delivered, 2);
    }

    #[test]
    fn pause_is_honoured_before_fetching() {
        let view = Arc::new(Recorder::default());
        view.pause.store(true, Ordering::SeqCst);
        SyncFetcher::new(view.clone(), Scripted(VecDeque::from([batch(&[1], true)]))).run();
        assert!(!view.should_pause());
        assert_eq!(view.delivered.lock().len(), 1);
    }

    #[test]
    fn idle_source_backs_off() {
        let view = Arc::new(Recorder::default());
        let config = ReplConfig::default().with_idle_backoff(Duration::from_millis(30));
        let fetcher = SyncFetcher::new(
            view.clone(),
            Scripted(VecDeque::from([Ok(OplogBatch::not_ready())])),
        )
        .with_config(&config);
        let stats = Arc::clone(&fetcher.stats);

        let start = Instant::now();
        fetcher.run();
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(stats.read().idle_backoffs, 1);
    }

    #[test]
    fn fatal_error_aborts_once() {
        let view = Arc::new(Recorder::default());
        let outcome = SyncFetcher::new(
            view.clone(),
            Scripted(VecDeque::from([
                Err(ReplicationError::stop("disk on fire")),
                batch(&[1], true),
            ])),
        )
        .run();

        assert!(matches!(outcome, FetcherOutcome::Aborted(_)));
        assert!(view.delivered.lock().is_empty());
        assert_eq!(
            *view.terminal.lock(),
            vec!["aborted: replication stopped: disk on fire"]
        );
    }

    #[test]
    fn panic_becomes_abort() {
        let view = Arc::new(Recorder::default());
        let outcome = SyncFetcher::new(view.clone(), Panicking).run();
        match outcome {
            FetcherOutcome::Aborted(err) => {
                assert!(err.is_fatal());
                assert!(err.to_string().contains("source exploded"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(view.terminal.lock().len(), 1);
    }

    #[test]
    fn rollback_ends_the_loop() {
        let view = Arc::new(Recorder::default());
        let outcome = SyncFetcher::new(
            view.clone(),
            Scripted(VecDeque::from([Err(ReplicationError::rollback(RollbackCause::new(
                "diverged", None,
            )))])),
        )
        .run();
        assert!(matches!(outcome, FetcherOutcome::RolledBack(_)));
        assert_eq!(*view.terminal.lock(), vec!["rollback: diverged"]);
    }

    #[test]
    fn stop_interrupts_a_spawned_loop() {
        let view = Arc::new(Recorder::default());
        let config = ReplConfig::new("test").with_idle_backoff(Duration::from_secs(60));
        let always_idle = Scripted((0..1000).map(|_| Ok(OplogBatch::not_ready())).collect());
        let handle = SyncFetcher::new(view.clone(), always_idle)
            .with_config(&config)
            .spawn()
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        handle.stop();
        let outcome = handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            outcome,
            FetcherOutcome::Finished(FinishReason::StopRequested)
        ));
        assert_eq!(*view.terminal.lock(), vec!["finished: stop requested"]);
    }
}
