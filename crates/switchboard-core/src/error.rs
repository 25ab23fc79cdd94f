//! Error types shared across the resilience layer.
//!
//! The cache itself has no error channel; these types cover the storage port
//! consulted on cache misses and the supervision of background tasks.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure reported by the persistent-store port.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Backing store rejected or failed the read.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

/// Errors from starting or stopping a background task.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The task is already running in this process.
    #[error("{task} is already running")]
    AlreadyStarted {
        /// Name of the task
        task: &'static str,
    },

    /// The task did not stop within the shutdown timeout.
    #[error("{task} did not stop within {timeout:?}")]
    ShutdownTimeout {
        /// Name of the task
        task: &'static str,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// The task panicked.
    #[error("{task} panicked: {error}")]
    TaskPanic {
        /// Name of the task
        task: &'static str,
        /// Join error message
        error: String,
    },
}
