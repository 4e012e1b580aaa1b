//! # TaskMesh Engine
//!
//! Client-side sync session state machine for TaskMesh.
//!
//! This crate provides:
//! - `SyncSession` — runs the push → verify → resolve → apply-resolution
//!   sequence against a server
//! - `PendingQueue` — mutations queued while offline, in causal order
//! - `ReplicaStore` — the client's cached copy of server state
//! - `SessionTransport` — transport abstraction with a mock for tests
//! - Retry with exponential backoff
//!
//! ## Session sequence
//!
//! A session moves `Idle → Pushing → Verifying → Resolving →
//! ApplyingResolution → Idle`, with `Error` reachable from every state.
//! No step assumes exclusive access to server entities, so a failed
//! session restarts safely from `Pushing`. Verification is idempotent and
//! resolution write-back is re-entrant, which makes retry-on-timeout safe
//! throughout.
//!
//! ## Key invariants
//!
//! - Per-entity push order is preserved; an event that errors blocks later
//!   events for the same entity until it succeeds
//! - Failed events stay queued — nothing is silently dropped
//! - Conflicted events are consumed and routed through resolution
//! - The server is authoritative for resolution decisions

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod queue;
mod replica;
mod session;
mod transport;

pub use config::{RetryConfig, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use queue::{PendingQueue, QueuedEvent};
pub use replica::{MemoryReplica, ReplicaStore};
pub use session::{SessionOutcome, SessionState, SessionStats, SyncSession};
pub use transport::{MockTransport, SessionTransport};
