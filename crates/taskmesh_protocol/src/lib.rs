//! # TaskMesh Protocol
//!
//! Sync protocol messages for TaskMesh.
//!
//! This crate provides:
//! - `SyncEvent` for client-queued mutations
//! - Hash verification request/response pairs
//! - Conflict resolution and resolved-data write-back messages
//! - Incremental change fetch messages
//!
//! This is a pure protocol crate with no I/O operations. Messages are
//! transport-agnostic serde types; the session sequence that strings them
//! together lives in the engine crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod event;
mod fetch;
mod resolution;
mod verify;

pub use event::{EventType, SyncEvent, SyncEventResponse, SyncEventStatus};
pub use fetch::{FetchChangesRequest, FetchChangesResponse};
pub use resolution::{
    ApplyResolvedDataRequest, ApplyResolvedDataResponse, BatchStatus, ConflictResolutionRequest,
    ConflictResolutionResponse, ItemFailure,
};
pub use verify::{HashMismatch, HashVerificationRequest, HashVerificationResponse, IdHash};
