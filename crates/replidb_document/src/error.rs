//! Error types for the document crate.

use thiserror::Error;

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors that can occur while reading or modifying documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// A dotted path was empty or contained an empty segment.
    #[error("invalid field path: '{path}'")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// A path traversed through a value that is not a document.
    #[error("cannot traverse '{path}': '{segment}' is not a document")]
    NotADocument {
        /// The full path being traversed.
        path: String,
        /// The segment whose value is not a document.
        segment: String,
    },

    /// A value had an unexpected type.
    #[error("type mismatch for '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        found: &'static str,
    },

    /// A required field was missing.
    #[error("missing field '{field}'")]
    MissingField {
        /// Field name.
        field: String,
    },
}

impl DocumentError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}
