//! # TaskMesh Model
//!
//! Entity records and change sets for TaskMesh.
//!
//! This crate provides:
//! - `Task`, `User` and `Group` records under synchronization
//! - `EntityId` and `Timestamp` primitives
//! - Typed change sets with an explicit unknown-field side channel
//! - Append-only task history entries
//! - Metadata high-water-mark keys
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod entity;
mod history;
mod id;
mod metadata;
mod time;

pub use changes::{EntityChanges, GroupChanges, TaskChanges, UserChanges};
pub use entity::{Entity, Group, Task, User};
pub use history::{HistoryAction, TaskHistoryEntry};
pub use id::{EntityId, EntityType};
pub use metadata::MetadataKey;
pub use time::Timestamp;
