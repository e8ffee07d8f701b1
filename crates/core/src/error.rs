//! Error types for stratagraph
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! `StrataError` is `Clone + PartialEq`: the cause captured when a commit is
//! vetoed is handed back verbatim from the rollback callback, and callers
//! compare it against what their listener raised.

use thiserror::Error;

/// Result type alias for stratagraph operations
pub type StrataResult<T> = std::result::Result<T, StrataError>;

/// Error types for the mapping and notification core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrataError {
    /// Entity, relationship or type not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A listener vetoed the transaction
    #[error("Vetoed: {reason}")]
    Vetoed {
        /// Reason given by the listener
        reason: String,
    },

    /// A property validator rejected a value
    #[error("Validation failed for {type_name}.{property}: {reason}")]
    Validation {
        /// Simple name of the entity type
        type_name: String,
        /// Property that failed validation
        property: String,
        /// Human-readable reason
        reason: String,
    },

    /// A property converter could not convert a value
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A store identity could not be turned into a typed entity
    #[error("Rehydration failed: {0}")]
    Rehydration(String),

    /// A validator or converter could not be constructed
    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    /// Commit hook invoked without a live transaction context
    #[error("No transaction context for commit callback")]
    TransactionContextMissing,

    /// Commit hook invoked with a context in the wrong state
    #[error("Invalid transaction state: expected {expected}, found {actual}")]
    InvalidTransactionState {
        /// State the operation requires
        expected: String,
        /// State the context was in
        actual: String,
    },

    /// Another transaction committed a conflicting change first
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Create a NotFound error
    pub fn not_found(what: impl Into<String>) -> Self {
        StrataError::NotFound(what.into())
    }

    /// Create an InvalidInput error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        StrataError::InvalidInput(msg.into())
    }

    /// Create a Vetoed error, the way listeners reject a transaction
    pub fn vetoed(reason: impl Into<String>) -> Self {
        StrataError::Vetoed {
            reason: reason.into(),
        }
    }

    /// Create a Validation error
    pub fn validation(
        type_name: impl Into<String>,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        StrataError::Validation {
            type_name: type_name.into(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Create a Conversion error
    pub fn conversion(msg: impl Into<String>) -> Self {
        StrataError::Conversion(msg.into())
    }

    /// Create a Conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        StrataError::Conflict(msg.into())
    }

    /// True if retrying the transaction from scratch may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, StrataError::Conflict(_))
    }

    /// Create a Config error
    pub fn config(msg: impl Into<String>) -> Self {
        StrataError::Config(msg.into())
    }

    /// Create an Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        StrataError::Internal(msg.into())
    }

    /// True for errors that indicate a caller-contract violation
    ///
    /// These are never produced by listeners and are not recoverable by
    /// retrying the same call.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            StrataError::TransactionContextMissing | StrataError::InvalidTransactionState { .. }
        )
    }
}
