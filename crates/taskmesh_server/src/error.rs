//! Error types for the sync server.

use taskmesh_digest::DigestError;
use taskmesh_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// Per-event and per-item failures are reported inline in response
/// payloads; these errors cover only structurally invalid requests and
/// infrastructure failures that fail the whole call.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request itself is malformed (oversized batch, missing fields).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Digest computation failed.
    #[error("digest error: {0}")]
    Digest(#[from] DigestError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is the caller's fault (4xx-class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Store(StoreError::NotFound { .. })
                | ServerError::Store(StoreError::WrongEntityType { .. })
                | ServerError::Store(StoreError::Validation(_))
        )
    }

    /// Returns true if this is a server-side failure (5xx-class).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns true if the same idempotent request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Store(e) if e.is_retryable())
    }
}
