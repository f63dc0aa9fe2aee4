//! Error types for oplog parsing.

use replidb_document::DocumentError;
use thiserror::Error;

/// Result type for oplog operations.
pub type OplogResult<T> = Result<T, OplogError>;

/// Errors raised while turning oplog entries into operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OplogError {
    /// The `op` field names no known operation kind.
    #[error("unknown oplog operation: '{code}'")]
    UnknownOperation {
        /// The unrecognized op code.
        code: String,
    },

    /// A required entry field is absent.
    #[error("oplog entry is missing field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// An entry field has the wrong type.
    #[error("oplog field '{field}' should be {expected}, found {found}")]
    InvalidField {
        /// Name of the field.
        field: &'static str,
        /// Expected type.
        expected: &'static str,
        /// Actual type.
        found: &'static str,
    },

    /// The namespace does not fit the operation kind.
    #[error("invalid namespace '{namespace}' for {kind} operation")]
    InvalidNamespace {
        /// The namespace string.
        namespace: String,
        /// The operation kind.
        kind: &'static str,
    },

    /// Document manipulation failed.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),
}

impl OplogError {
    /// Creates an unknown operation error.
    pub fn unknown_operation(code: impl Into<String>) -> Self {
        Self::UnknownOperation { code: code.into() }
    }

    /// Returns true if the entry carried an unrecognized op code.
    pub fn is_unknown_operation(&self) -> bool {
        matches!(self, Self::UnknownOperation { .. })
    }
}
