//! Error types for store operations
//!
//! Applying a transition never fails: unknown ids are silent no-ops and the
//! outcome of tracked work is recorded as data on the record. The errors
//! below cover the plumbing around the store instead: a store task that has
//! gone away, and configuration or snapshot (de)serialization failures.

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur around the operation store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The owning store task has stopped, so the command was not applied
    #[error("Async store is closed")]
    Closed,

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StoreError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Closed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for StoreError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Closed
    }
}
