//! Error types for the replication engine.

use replidb_core::{CommandError, CoreError};
use replidb_oplog::OpTime;
use std::fmt;
use thiserror::Error;

/// Result type for applying a single operation.
pub type ApplyingResult<T> = Result<T, ApplyingError>;

/// One oplog operation could not be applied.
///
/// Always local to a single `apply` call; the caller turns it into a
/// [`ReplicationError`] (normally [`ReplicationError::Stop`]).
#[derive(Debug, Clone, Error)]
pub enum ApplyingError {
    /// A command operation named no registered command. Carries the
    /// leading key of the request, or `"?"` for an empty request.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// A store or replication command returned a not-ok status, or its
    /// arguments could not be unmarshalled.
    #[error("command failed: {0}")]
    Command(#[from] CommandError),

    /// An insert into the index catalog did not describe a valid index.
    #[error("invalid index specification: {0}")]
    InvalidIndexSpec(String),

    /// The transaction itself failed.
    #[error("store error: {0}")]
    Core(#[from] CoreError),
}

impl ApplyingError {
    /// Creates a command-not-found error from a request's leading key.
    pub fn command_not_found(leading_key: Option<&str>) -> Self {
        Self::CommandNotFound(leading_key.unwrap_or("?").to_string())
    }

    /// Returns true if the operation named an unknown command.
    pub fn is_command_not_found(&self) -> bool {
        matches!(self, Self::CommandNotFound(_))
    }
}

/// Why the source asked for a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackCause {
    /// Human-readable description of the divergence.
    pub reason: String,
    /// Last position this replica fetched before the divergence, if known.
    pub last_fetched: Option<OpTime>,
}

impl RollbackCause {
    /// Creates a rollback cause.
    pub fn new(reason: impl Into<String>, last_fetched: Option<OpTime>) -> Self {
        Self {
            reason: reason.into(),
            last_fetched,
        }
    }
}

impl fmt::Display for RollbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_fetched {
            Some(optime) => write!(f, "{} (last fetched {})", self.reason, optime),
            None => f.write_str(&self.reason),
        }
    }
}

/// Result type for the replication loop and its collaborators.
pub type ReplResult<T> = Result<T, ReplicationError>;

/// Loop-level classification of a failure.
#[derive(Debug, Clone, Error)]
pub enum ReplicationError {
    /// A wait was cut short by cancellation. Transient: the loop restarts
    /// its iteration, or exits if a stop was requested.
    #[error("interrupted")]
    Interrupted,

    /// The current iteration should be retried.
    #[error("retrying: {reason}")]
    Retry {
        /// Why the iteration failed.
        reason: String,
    },

    /// The source history diverged from what was already fetched.
    #[error("rollback required: {0}")]
    Rollback(RollbackCause),

    /// Unrecoverable failure; ends the loop.
    #[error("replication stopped: {message}")]
    Stop {
        /// Description of the failure.
        message: String,
        /// The operation failure behind it, if any.
        #[source]
        source: Option<ApplyingError>,
    },
}

impl ReplicationError {
    /// Creates a retry signal.
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }

    /// Creates a rollback signal.
    pub fn rollback(cause: RollbackCause) -> Self {
        Self::Rollback(cause)
    }

    /// Creates a fatal error without an operation failure behind it.
    pub fn stop(message: impl Into<String>) -> Self {
        Self::Stop {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if the loop should simply run the iteration again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Retry { .. })
    }

    /// Returns true if this signals a source-side history rewrite.
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback(_))
    }

    /// Returns true if the loop must end through the abort path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }
}

impl From<ApplyingError> for ReplicationError {
    fn from(err: ApplyingError) -> Self {
        Self::Stop {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_core::ErrorCode;

    #[test]
    fn classification() {
        assert!(ReplicationError::Interrupted.is_retryable());
        assert!(ReplicationError::retry("deliver interrupted").is_retryable());
        assert!(ReplicationError::rollback(RollbackCause::new("diverged", None)).is_rollback());
        assert!(ReplicationError::stop("boom").is_fatal());
        assert!(!ReplicationError::stop("boom").is_retryable());
    }

    #[test]
    fn command_not_found_names() {
        assert_eq!(
            ApplyingError::command_not_found(None).to_string(),
            "command not found: ?"
        );
        let err = ApplyingError::command_not_found(Some("fooBar"));
        assert!(err.is_command_not_found());
        assert!(matches!(err, ApplyingError::CommandNotFound(ref name) if name == "fooBar"));
    }

    #[test]
    fn applying_error_becomes_stop() {
        let cause = ApplyingError::Command(CommandError::new(ErrorCode::DuplicateKey, "dup"));
        let err = ReplicationError::from(cause);
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "replication stopped: command failed: DuplicateKey: dup");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn rollback_cause_display() {
        let cause = RollbackCause::new("entry rewritten", Some(OpTime::new(4, 2)));
        assert_eq!(
            cause.to_string(),
            "entry rewritten (last fetched { ts: Timestamp(4, 2) })"
        );
    }
}
