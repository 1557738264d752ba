//! Shared error and result types

use thiserror::Error;

/// Errors surfaced by the gate network service
#[derive(Debug, Error)]
pub enum SgError {
    /// Persistence backend failure (query, connection, serialization)
    #[error("database error: {0}")]
    Database(String),

    /// No location registry backend could be initialized at startup
    #[error("no location database backend available")]
    BackendUnavailable,

    /// Registry lookup miss; always recoverable by the caller
    #[error("location not found")]
    NotFound,

    /// Admin authentication failure
    #[error("auth error: {0}")]
    Auth(String),

    /// A second waiter attached to an event mailbox before the first drained
    #[error("a waiter is already attached to mailbox '{0}'")]
    WaiterConflict(String),

    /// Malformed request input (query parameters, JSON bodies)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SgError>;
