//! Error types for the sync session.

use taskmesh_digest::DigestError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while running a sync session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the request outright.
    #[error("server error: {0}")]
    Server(String),

    /// Malformed message or unexpected response shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Digest computation failed on the replica.
    #[error("digest error: {0}")]
    Digest(#[from] DigestError),

    /// The replica store failed.
    #[error("replica error: {0}")]
    Replica(String),

    /// The session was cancelled.
    #[error("session cancelled")]
    Cancelled,

    /// A session step was started from the wrong state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SessionError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the same idempotent step can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport { retryable, .. } => *retryable,
            SessionError::Server(_) => true,
            _ => false,
        }
    }
}
