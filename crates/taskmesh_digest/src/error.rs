//! Error types for digest computation.

use thiserror::Error;

/// Result type for digest operations.
pub type DigestResult<T> = Result<T, DigestError>;

/// Errors that can occur while computing a digest.
#[derive(Debug, Error)]
pub enum DigestError {
    /// The canonical CBOR encoding failed.
    #[error("canonical encoding failed: {0}")]
    Encode(String),

    /// A digest string on the wire was malformed.
    #[error("malformed digest: {0}")]
    MalformedDigest(String),
}
