//! Test fixtures for the replication loop.
//!
//! Provides a view that records what the loop tells it, a fetch source
//! that replays a script, and helpers to build operations and dump files.

use parking_lot::Mutex;
use replidb_document::{doc, Document};
use replidb_oplog::{OpTime, Operation, OplogBatch};
use replidb_repl::{
    CancellationToken, FinishReason, OplogFetcher, ReplResult, ReplicationError, RollbackCause,
    SyncServiceView,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Something a [`RecordingView`] was told.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// An operation was accepted.
    Delivered(OpTime),
    /// A rollback was requested.
    Rollback(RollbackCause),
    /// The loop finished.
    Finished(FinishReason),
    /// The loop aborted; carries the error message.
    Aborted(String),
}

impl ViewEvent {
    /// Returns true for the three terminal notifications.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ViewEvent::Delivered(_))
    }
}

/// A [`SyncServiceView`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
    delivered: Mutex<Vec<Operation>>,
    scripted_failures: Mutex<HashMap<usize, ReplicationError>>,
    scripted_panics: Mutex<HashSet<usize>>,
    deliver_attempts: AtomicUsize,
    paused: AtomicBool,
}

impl RecordingView {
    /// Creates a view that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the delivery attempt number `attempt` (zero-based, counting
    /// failed attempts too) fail with `error`.
    pub fn fail_delivery_at(&self, attempt: usize, error: ReplicationError) {
        self.scripted_failures.lock().insert(attempt, error);
    }

    /// Makes the delivery attempt number `attempt` panic, as an
    /// unclassified failure would.
    pub fn panic_on_delivery_at(&self, attempt: usize) {
        self.scripted_panics.lock().insert(attempt);
    }

    /// Sets what [`SyncServiceView::should_pause`] reports.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Every event in order.
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    /// The terminal notifications received.
    pub fn terminal_events(&self) -> Vec<ViewEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_terminal())
            .cloned()
            .collect()
    }

    /// Accepted operations in order.
    pub fn delivered(&self) -> Vec<Operation> {
        self.delivered.lock().clone()
    }

    /// Optimes of accepted operations in order.
    pub fn delivered_optimes(&self) -> Vec<OpTime> {
        self.delivered.lock().iter().map(|op| op.optime).collect()
    }

    /// Number of delivery attempts, failed ones included.
    pub fn deliver_attempts(&self) -> usize {
        self.deliver_attempts.load(Ordering::SeqCst)
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().push(event);
    }
}

impl SyncServiceView for RecordingView {
    fn deliver(&self, op: &Operation, token: &CancellationToken) -> ReplResult<()> {
        token.check()?;
        let attempt = self.deliver_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.scripted_failures.lock().remove(&attempt) {
            return Err(error);
        }
        if self.scripted_panics.lock().remove(&attempt) {
            panic!("delivery attempt {attempt} failed unexpectedly");
        }
        self.delivered.lock().push(op.clone());
        self.push(ViewEvent::Delivered(op.optime));
        Ok(())
    }

    fn rollback(&self, cause: RollbackCause) {
        self.push(ViewEvent::Rollback(cause));
    }

    fn await_until_unpaused(&self, token: &CancellationToken) -> ReplResult<()> {
        while self.should_pause() {
            token.sleep(Duration::from_millis(5))?;
        }
        Ok(())
    }

    fn should_pause(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn await_until_all_fetched_are_applied(&self, token: &CancellationToken) -> ReplResult<()> {
        token.check()
    }

    fn fetch_finished(&self, reason: FinishReason) {
        self.push(ViewEvent::Finished(reason));
    }

    fn fetch_aborted(&self, error: ReplicationError) {
        self.push(ViewEvent::Aborted(error.to_string()));
    }
}

/// A fetch source that replays a fixed script, then reports the log
/// exhausted.
#[derive(Debug)]
pub struct ScriptedFetcher {
    script: VecDeque<ReplResult<OplogBatch>>,
    fetches: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    /// Creates a fetcher answering with `script` in order.
    pub fn new(script: impl IntoIterator<Item = ReplResult<OplogBatch>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of fetch calls, shared with the fetcher.
    pub fn fetch_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

impl OplogFetcher for ScriptedFetcher {
    fn fetch(&mut self, token: &CancellationToken) -> ReplResult<OplogBatch> {
        token.check()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(OplogBatch::last()))
    }
}

/// Optime `(1, inc)`.
pub fn optime(inc: u32) -> OpTime {
    OpTime::new(1, inc)
}

/// A batch of `ops`.
pub fn batch(ops: Vec<Operation>, ready_for_more: bool) -> OplogBatch {
    OplogBatch::new(ops, ready_for_more)
}

/// `count` inserts of `{ _id: i, n: i }` with optimes `(1, 1)..=(1, count)`.
pub fn insert_ops(database: &str, collection: &str, count: u32) -> Vec<Operation> {
    (1..=count)
        .map(|i| {
            Operation::insert(
                optime(i),
                database,
                collection,
                doc! { "_id" => i64::from(i), "n" => i64::from(i) },
            )
            .with_hash(i64::from(i))
        })
        .collect()
}

/// Writes `ops` as a JSON-lines oplog dump.
pub fn oplog_dump_file(ops: &[Operation]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    for op in ops {
        let line = serde_json::to_string(&op.to_entry()).expect("Failed to encode entry");
        writeln!(file, "{line}").expect("Failed to write entry");
    }
    file.flush().expect("Failed to flush dump file");
    file
}

/// Writes raw oplog entry documents as a JSON-lines dump.
pub fn raw_dump_file(entries: &[Document]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    for entry in entries {
        let line = serde_json::to_string(entry).expect("Failed to encode entry");
        writeln!(file, "{line}").expect("Failed to write entry");
    }
    file.flush().expect("Failed to flush dump file");
    file
}
