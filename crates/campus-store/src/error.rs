//! Store adapter error types.

use thiserror::Error;

/// Errors surfaced by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested person does not exist.
    #[error("person not found: {key}")]
    NotFound { key: String },

    /// A person with the same key already exists.
    #[error("person already exists: {key}")]
    AlreadyExists { key: String },

    /// The store rejected an individual operation.
    #[error("store rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    /// The store backend could not be reached.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an already-exists error.
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    /// Create a rejected-operation error.
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Check if this error is transient (the backend may recover).
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
