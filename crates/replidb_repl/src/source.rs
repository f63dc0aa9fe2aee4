//! Where fetched batches come from.

use crate::cancel::CancellationToken;
use crate::error::{ReplResult, ReplicationError, RollbackCause};
use parking_lot::RwLock;
use replidb_oplog::{OpTime, Operation, OplogBatch};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default number of operations per fetched batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Produces batches of the remote log.
///
/// Implementations may block and may fail with any loop-level
/// classification: [`ReplicationError::Retry`] for transient trouble,
/// [`ReplicationError::Rollback`] when the source history diverged, and
/// [`ReplicationError::Stop`] for fatal errors.
pub trait OplogFetcher: Send {
    /// Fetches the next batch.
    fn fetch(&mut self, token: &CancellationToken) -> ReplResult<OplogBatch>;
}

impl<F: OplogFetcher + ?Sized> OplogFetcher for Box<F> {
    fn fetch(&mut self, token: &CancellationToken) -> ReplResult<OplogBatch> {
        (**self).fetch(token)
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    entries: Vec<Operation>,
    closed: bool,
}

/// An in-memory remote log.
///
/// Appends model the primary writing; truncation models the primary losing
/// history (which replicas must detect as a rollback); closing marks the
/// log as exhausted.
#[derive(Debug, Default)]
pub struct RemoteOplog {
    state: RwLock<RemoteState>,
}

impl RemoteOplog {
    /// Creates an empty, open log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an open log holding `entries`.
    pub fn from_operations(entries: Vec<Operation>) -> Self {
        Self {
            state: RwLock::new(RemoteState {
                entries,
                closed: false,
            }),
        }
    }

    /// Appends an entry.
    pub fn append(&self, op: Operation) {
        self.state.write().entries.push(op);
    }

    /// Appends entries in order.
    pub fn extend(&self, ops: impl IntoIterator<Item = Operation>) {
        self.state.write().entries.extend(ops);
    }

    /// Removes every entry after `optime`. Returns how many were removed.
    pub fn truncate_after(&self, optime: OpTime) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|op| op.optime <= optime);
        before - state.entries.len()
    }

    /// Replaces every entry, as a source whose history was rewritten.
    pub fn rewrite(&self, entries: Vec<Operation>) {
        self.state.write().entries = entries;
    }

    /// Marks the log as exhausted: once drained, fetchers get the terminal
    /// batch.
    pub fn close(&self) {
        self.state.write().closed = true;
    }

    /// Returns true if the log was closed.
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

/// Last entry handed out, remembered to detect history rewrites.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    position: usize,
    optime: OpTime,
    hash: i64,
}

/// Fetches batches from a [`RemoteOplog`].
///
/// Before every fetch the fetcher checks that the last entry it handed out
/// is still in the log at the same position with the same optime and hash;
/// otherwise the source rewrote its history and the fetch fails with a
/// rollback.
#[derive(Debug)]
pub struct RemoteOplogFetcher {
    source: Arc<RemoteOplog>,
    batch_size: usize,
    cursor: Option<Cursor>,
}

impl RemoteOplogFetcher {
    /// Creates a fetcher reading from the start of the log.
    pub fn new(source: Arc<RemoteOplog>) -> Self {
        Self {
            source,
            batch_size: DEFAULT_BATCH_SIZE,
            cursor: None,
        }
    }

    /// Sets the maximum batch size. Zero is raised to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Returns the optime of the last entry handed out.
    pub fn last_fetched(&self) -> Option<OpTime> {
        self.cursor.map(|c| c.optime)
    }
}

impl OplogFetcher for RemoteOplogFetcher {
    fn fetch(&mut self, token: &CancellationToken) -> ReplResult<OplogBatch> {
        token.check()?;
        let state = self.source.state.read();

        if let Some(cursor) = self.cursor {
            let unchanged = state
                .entries
                .get(cursor.position)
                .is_some_and(|op| op.optime == cursor.optime && op.hash == cursor.hash);
            if !unchanged {
                debug!(optime = %cursor.optime, hash = cursor.hash, "last fetched entry is gone from the source");
                return Err(ReplicationError::rollback(RollbackCause::new(
                    format!(
                        "entry {} with hash {} is no longer in the remote oplog",
                        cursor.optime, cursor.hash
                    ),
                    Some(cursor.optime),
                )));
            }
        }

        let start = self.cursor.map_or(0, |c| c.position + 1);
        let available = state.entries.len().saturating_sub(start);
        if available == 0 {
            return Ok(if state.closed {
                OplogBatch::last()
            } else {
                OplogBatch::not_ready()
            });
        }

        let take = available.min(self.batch_size);
        let ops = state.entries[start..start + take].to_vec();
        if let Some(last) = ops.last() {
            self.cursor = Some(Cursor {
                position: start + take - 1,
                optime: last.optime,
                hash: last.hash,
            });
        }
        // A closed log is ready for the fetch that returns the terminal batch.
        let ready_for_more = take < available || state.closed;
        trace!(fetched = take, ready_for_more, "fetched batch");
        Ok(OplogBatch::new(ops, ready_for_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(inc: u32) -> Operation {
        Operation::noop(OpTime::new(1, inc)).with_hash(i64::from(inc))
    }

    #[test]
    fn batches_follow_log_order() {
        let log = Arc::new(RemoteOplog::from_operations((1..=5).map(noop).collect()));
        let mut fetcher = RemoteOplogFetcher::new(log.clone()).with_batch_size(2);
        let token = CancellationToken::new();

        let first = fetcher.fetch(&token).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.is_ready_for_more());
        let second = fetcher.fetch(&token).unwrap();
        assert_eq!(second.operations()[0], noop(3));
        let third = fetcher.fetch(&token).unwrap();
        assert_eq!(third.len(), 1);
        assert!(!third.is_ready_for_more());
        assert_eq!(fetcher.last_fetched(), Some(OpTime::new(1, 5)));

        let idle = fetcher.fetch(&token).unwrap();
        assert!(idle.is_empty() && !idle.is_last_one() && !idle.is_ready_for_more());

        log.close();
        assert!(fetcher.fetch(&token).unwrap().is_last_one());
    }

    #[test]
    fn appended_entries_are_picked_up() {
        let log = Arc::new(RemoteOplog::new());
        let mut fetcher = RemoteOplogFetcher::new(log.clone());
        let token = CancellationToken::new();

        assert!(fetcher.fetch(&token).unwrap().is_empty());
        log.extend([noop(1), noop(2)]);
        assert_eq!(fetcher.fetch(&token).unwrap().len(), 2);
        log.append(noop(3));
        assert_eq!(fetcher.fetch(&token).unwrap().operations(), &[noop(3)]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn truncation_is_detected_as_rollback() {
        let log = Arc::new(RemoteOplog::from_operations((1..=3).map(noop).collect()));
        let mut fetcher = RemoteOplogFetcher::new(log.clone());
        let token = CancellationToken::new();
        fetcher.fetch(&token).unwrap();

        assert_eq!(log.truncate_after(OpTime::new(1, 1)), 2);
        log.append(noop(4));

        let err = fetcher.fetch(&token).unwrap_err();
        assert!(err.is_rollback());
        match err {
            ReplicationError::Rollback(cause) => {
                assert_eq!(cause.last_fetched, Some(OpTime::new(1, 3)));
            }
            other => panic!("expected rollback, got {other}"),
        }
    }

    #[test]
    fn rewritten_history_is_detected_as_rollback() {
        let log = Arc::new(RemoteOplog::from_operations(vec![noop(1), noop(2)]));
        let mut fetcher = RemoteOplogFetcher::new(log.clone());
        let token = CancellationToken::new();
        fetcher.fetch(&token).unwrap();

        // Same optimes, different hashes.
        log.rewrite(vec![noop(1), noop(2).with_hash(99)]);
        assert!(fetcher.fetch(&token).unwrap_err().is_rollback());
    }

    #[test]
    fn cancelled_token_interrupts_fetch() {
        let mut fetcher = RemoteOplogFetcher::new(Arc::new(RemoteOplog::new()));
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(fetcher.fetch(&token), Err(ReplicationError::Interrupted)));
    }
}
