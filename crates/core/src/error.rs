//! Error types for TempoDB
//!
//! This module defines the unified error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Classification
//!
//! - **Temporal failures (`Conflict`)**: another transaction won the race.
//!   These are retryable - re-running the transaction against fresh data may
//!   succeed.
//! - **Resource failures (`TransactionLimit`, `CacheFull`)**: the offending
//!   operation failed; the transaction should be aborted by the caller.
//! - **Structural failures (`InvalidKey`, `ThreadNotRegistered`,
//!   `HandleClosed`)**: usage errors that require a code change to resolve.
//! - **`Storage`**: the underlying key-value engine reported a failure. The
//!   transaction cannot make progress.

use thiserror::Error;

/// Unified result type for TempoDB operations.
pub type TempoResult<T> = std::result::Result<T, TempoError>;

/// Unified error type for TempoDB operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TempoError {
    /// The transaction lost a race with a concurrent committer.
    ///
    /// Returned from commit when read validation fails or a validated row is
    /// locked by another writer. The transaction has been aborted and its
    /// buffered writes discarded; the caller may retry from the beginning.
    #[error("transaction conflict: {reason}")]
    Conflict {
        /// What the validator observed when it gave up
        reason: String,
    },

    /// The underlying key-value engine failed.
    #[error("storage engine error: {message}")]
    Storage {
        /// Backend-provided failure description
        message: String,
    },

    /// The transaction touched more distinct keys than the read/write set
    /// can hold.
    #[error("transaction touched more than {limit} distinct keys")]
    TransactionLimit {
        /// Maximum number of distinct keys per transaction
        limit: usize,
    },

    /// The timestamp cache has no free slot and no evictable entry.
    ///
    /// Every resident entry is referenced by a live transaction. The
    /// offending operation failed; the transaction should be aborted.
    #[error("timestamp cache is full")]
    CacheFull,

    /// The calling thread has not been registered with the database.
    #[error("calling thread is not registered with the database")]
    ThreadNotRegistered,

    /// The database handle has been closed.
    #[error("database handle is closed")]
    HandleClosed,

    /// The key is structurally invalid (empty or oversized).
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Which validation rule the key violated
        reason: String,
    },
}

impl TempoError {
    /// Build a `Conflict` error from any displayable reason.
    pub fn conflict(reason: impl Into<String>) -> Self {
        TempoError::Conflict {
            reason: reason.into(),
        }
    }

    /// Build a `Storage` error from any displayable message.
    pub fn storage(message: impl Into<String>) -> Self {
        TempoError::Storage {
            message: message.into(),
        }
    }

    /// Check whether retrying the whole transaction may succeed.
    ///
    /// True exactly for [`TempoError::Conflict`]. All other errors require
    /// either an input change or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TempoError::Conflict { .. })
    }
}
