//! # TaskMesh Store
//!
//! Authoritative entity store for the TaskMesh sync server.
//!
//! This crate provides:
//! - `EntityStore` with per-entity locking for atomic compare-then-apply
//! - Append-only task history log
//! - Forward-only metadata high-water marks
//! - A `Clock` abstraction for timestamp sourcing
//!
//! ## Concurrency
//!
//! Each entity row sits behind its own lock inside a table-level `RwLock`.
//! Two mutations targeting different entities commit concurrently; two
//! targeting the same entity serialize, so the hash comparison and the
//! write that follows it execute as one atomic step.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use store::EntityStore;
