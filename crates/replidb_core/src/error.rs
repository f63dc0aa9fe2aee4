//! Error types for ReplIDB core.

use replidb_document::DocumentError;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ReplIDB core operations.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Document manipulation failed.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Namespace string could not be parsed.
    #[error("invalid namespace: '{namespace}'")]
    InvalidNamespace {
        /// The offending namespace.
        namespace: String,
    },

    /// Operation not permitted in the transaction's current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl CoreError {
    /// Creates an invalid namespace error.
    pub fn invalid_namespace(namespace: impl Into<String>) -> Self {
        Self::InvalidNamespace {
            namespace: namespace.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Result type for command execution.
///
/// `Ok` is an ok status carrying the command reply; `Err` is a not-ok
/// status carrying the error detail.
pub type CommandResult<T> = Result<T, CommandError>;

/// Classified error codes reported by commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A write was issued by a user against a replica.
    NotWritablePrimary,
    /// A unique index would be violated.
    DuplicateKey,
    /// An argument had an invalid value.
    BadValue,
    /// A request document could not be parsed.
    FailedToParse,
    /// A value had the wrong type for the requested operation.
    TypeMismatch,
    /// An update tried to change the `_id` of a document.
    ImmutableField,
    /// The target collection does not exist.
    NamespaceNotFound,
    /// The target collection already exists.
    NamespaceExists,
    /// The target index does not exist.
    IndexNotFound,
    /// The command is not known.
    CommandNotFound,
    /// The operation is not allowed in the current state.
    IllegalOperation,
    /// Unclassified failure.
    Unknown,
}

impl ErrorCode {
    /// Returns the conventional name of this code.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NotWritablePrimary => "NotWritablePrimary",
            ErrorCode::DuplicateKey => "DuplicateKey",
            ErrorCode::BadValue => "BadValue",
            ErrorCode::FailedToParse => "FailedToParse",
            ErrorCode::TypeMismatch => "TypeMismatch",
            ErrorCode::ImmutableField => "ImmutableField",
            ErrorCode::NamespaceNotFound => "NamespaceNotFound",
            ErrorCode::NamespaceExists => "NamespaceExists",
            ErrorCode::IndexNotFound => "IndexNotFound",
            ErrorCode::CommandNotFound => "CommandNotFound",
            ErrorCode::IllegalOperation => "IllegalOperation",
            ErrorCode::Unknown => "UnknownError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A not-ok command status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    /// Classified error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl CommandError {
    /// Creates a new command error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a bad value error.
    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadValue, message)
    }

    /// Creates a failed to parse error.
    pub fn failed_to_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedToParse, message)
    }

    /// Creates a namespace not found error.
    pub fn namespace_not_found(namespace: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NamespaceNotFound,
            format!("ns not found: {namespace}"),
        )
    }
}

impl From<DocumentError> for CommandError {
    fn from(err: DocumentError) -> Self {
        let code = match err {
            DocumentError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            DocumentError::MissingField { .. } => ErrorCode::FailedToParse,
            DocumentError::InvalidPath { .. } | DocumentError::NotADocument { .. } => {
                ErrorCode::BadValue
            }
        };
        Self::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_display() {
        let err = CommandError::new(ErrorCode::DuplicateKey, "dup _id: 1");
        assert_eq!(err.to_string(), "DuplicateKey: dup _id: 1");
    }

    #[test]
    fn document_errors_are_classified() {
        let err: CommandError = DocumentError::invalid_path("a..b").into();
        assert_eq!(err.code, ErrorCode::BadValue);

        let err: CommandError = DocumentError::missing_field("key").into();
        assert_eq!(err.code, ErrorCode::FailedToParse);
    }
}
