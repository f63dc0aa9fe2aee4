//! Cooperative cancellation.

use crate::error::{ReplResult, ReplicationError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity at which waits on foreign conditions re-check the token.
pub(crate) const WAIT_SLICE: Duration = Duration::from_millis(20);

/// A shareable stop signal.
///
/// Every blocking call in the replication loop takes a token. Cancelling
/// wakes sleepers on the token at once; waits on other conditions notice
/// within [`WAIT_SLICE`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token, waking every sleeper.
    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.wake.notify_all();
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Fails with [`ReplicationError::Interrupted`] if cancelled.
    pub fn check(&self) -> ReplResult<()> {
        if self.is_cancelled() {
            Err(ReplicationError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Interrupted`] if the token is or becomes
    /// cancelled before the duration elapses.
    pub fn sleep(&self, duration: Duration) -> ReplResult<()> {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.wake.wait_until(&mut cancelled, deadline).timed_out() {
                return Ok(());
            }
        }
        Err(ReplicationError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sleep_runs_to_completion() {
        let token = CancellationToken::new();
        let start = Instant::now();
        token.sleep(Duration::from_millis(30)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn cancel_wakes_sleeper() {
        let token = CancellationToken::new();
        let sleeper = token.clone();
        let start = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(ReplicationError::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn check_after_cancel() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.clone().cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
        assert!(token.sleep(Duration::from_secs(10)).is_err());
    }
}
