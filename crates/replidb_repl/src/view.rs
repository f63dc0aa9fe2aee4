//! The contract between the fetch loop and whatever applies operations.

use crate::cancel::CancellationToken;
use crate::error::{ReplResult, ReplicationError, RollbackCause};
use replidb_oplog::Operation;
use std::fmt;

/// Why a fetch loop ended cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// The source reported its log exhausted.
    OplogExhausted,
    /// The loop was asked to stop.
    StopRequested,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::OplogExhausted => f.write_str("remote oplog finished"),
            FinishReason::StopRequested => f.write_str("stop requested"),
        }
    }
}

/// Callbacks the [`SyncFetcher`](crate::SyncFetcher) drives.
///
/// The loop holds the view; the view never holds the loop. Every blocking
/// method takes the loop's cancellation token and returns
/// [`ReplicationError::Interrupted`] once it is cancelled.
///
/// Exactly one of [`rollback`](Self::rollback),
/// [`fetch_finished`](Self::fetch_finished) and
/// [`fetch_aborted`](Self::fetch_aborted) is called per run.
pub trait SyncServiceView: Send + Sync {
    /// Hands over the next operation, in log order. May block for
    /// backpressure.
    fn deliver(&self, op: &Operation, token: &CancellationToken) -> ReplResult<()>;

    /// The source history diverged.
    fn rollback(&self, cause: RollbackCause);

    /// Blocks until the view no longer wants the loop paused.
    fn await_until_unpaused(&self, token: &CancellationToken) -> ReplResult<()>;

    /// Returns true if the loop should pause before fetching again.
    fn should_pause(&self) -> bool;

    /// Blocks until everything delivered so far has been applied.
    fn await_until_all_fetched_are_applied(&self, token: &CancellationToken) -> ReplResult<()>;

    /// The loop ended without error.
    fn fetch_finished(&self, reason: FinishReason);

    /// The loop ended because of an unrecoverable error.
    fn fetch_aborted(&self, error: ReplicationError);
}
