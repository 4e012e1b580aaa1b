//! # TaskMesh Server
//!
//! Sync server core for TaskMesh.
//!
//! This crate provides:
//! - `EventApplier` — applies client-submitted mutations with conflict
//!   detection
//! - `ConflictResolver` — batch hash verification and timestamp-based
//!   resolution
//! - `RequestHandler` / `SyncServer` — the session-facing surface an HTTP
//!   layer delegates to
//! - One-time telemetry initialization
//!
//! # Architecture
//!
//! Each session step (push, verify, resolve, apply-resolution) is a
//! short-lived unit of work; no per-client thread or connection state is
//! held. All shared mutable state lives in the [`taskmesh_store`] entity
//! store, whose per-entity locks make compare-then-apply atomic. Handlers
//! are synchronous library calls — transport plumbing stays outside this
//! crate.
//!
//! # Conflict policy
//!
//! Precedence is purely `updated_at` comparison: the later write wins and
//! exact ties resolve to the server, so every replica converges without a
//! client-side tiebreak. The server is authoritative for resolution
//! decisions.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod error;
mod handler;
mod resolver;
mod server;
mod telemetry;

pub use applier::EventApplier;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use resolver::{ConflictResolver, Winner};
pub use server::SyncServer;
pub use telemetry::init_telemetry;
