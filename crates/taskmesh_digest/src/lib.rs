//! # TaskMesh Digest
//!
//! Canonical entity digests for TaskMesh sync.
//!
//! This crate provides:
//! - `EntityDigest`, a SHA-256 fingerprint of an entity's content
//! - `digest_entity`, the canonical hashing routine
//!
//! Both sides of the sync protocol (server and clients, in any language)
//! must produce byte-identical digests for the same entity content. The
//! canonical form is a CBOR map with lexicographically sorted text keys,
//! sorted id arrays and integer millisecond timestamps, so field order
//! and encoding variations on the source side cannot change the digest.
//!
//! Precedence bookkeeping (`updated_at`) is excluded: two records that
//! agree on every content field are equivalent for sync purposes even if
//! they were written at different times.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod canonical;
mod digest;
mod error;

pub use canonical::canonical_bytes;
pub use digest::{digest_entity, EntityDigest};
pub use error::{DigestError, DigestResult};
