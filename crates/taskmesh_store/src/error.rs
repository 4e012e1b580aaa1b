//! Error types for the entity store.

use taskmesh_model::{EntityId, EntityType};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("{entity_type} {id} not found")]
    NotFound {
        /// The kind of entity looked up.
        entity_type: EntityType,
        /// The identifier that was not found.
        id: EntityId,
    },

    /// An entity of a different type already holds the identifier.
    #[error("id {id} is a {actual}, not a {expected}")]
    WrongEntityType {
        /// The identifier in question.
        id: EntityId,
        /// The type the caller expected.
        expected: EntityType,
        /// The type actually stored.
        actual: EntityType,
    },

    /// The payload failed validation before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store is temporarily unavailable; the caller may retry the
    /// same idempotent request.
    #[error("transient store error: {0}")]
    Transient(String),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(entity_type: EntityType, id: EntityId) -> Self {
        Self::NotFound { entity_type, id }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
