//! Hash verification messages.

use crate::resolution::BatchStatus;
use serde::{Deserialize, Serialize};
use taskmesh_digest::EntityDigest;
use taskmesh_model::{Entity, EntityId, EntityType};

/// One `{id, hash}` pair in a client's verification list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdHash {
    /// Entity identifier.
    pub id: EntityId,
    /// The client's digest for that entity.
    pub hash: EntityDigest,
}

/// A detected divergence between client and server state.
///
/// Carries both candidate fingerprints plus the server's current state,
/// so the client can apply the same precedence rule locally and converge
/// even when the winning entity predates its fetch checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    /// Entity identifier.
    pub id: EntityId,
    /// The digest the client reported.
    pub client_hash: EntityDigest,
    /// The server's current digest.
    pub server_hash: EntityDigest,
    /// The server's current state, tombstones included.
    pub server_entity: Entity,
}

/// Client request: verify a full `{id, hash}` list for one entity type.
///
/// Safe to retry; verification never mutates server state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashVerificationRequest {
    /// The kind of entity being verified.
    pub entity_type: EntityType,
    /// The client's complete digest list for that type.
    pub hashes: Vec<IdHash>,
}

impl HashVerificationRequest {
    /// Creates a verification request.
    pub fn new(entity_type: EntityType, hashes: Vec<IdHash>) -> Self {
        Self {
            entity_type,
            hashes,
        }
    }
}

/// Server response: three-way partition of the verification lists.
///
/// Every id from the client's list and every id the server holds lands in
/// exactly one bucket; matching ids are implicit (reported in none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashVerificationResponse {
    /// Overall batch status.
    pub status: BatchStatus,
    /// Same id on both sides, digests differ. Needs resolution. Tombstoned
    /// entities the client still holds live show up here.
    pub conflicts: Vec<HashMismatch>,
    /// Ids the server holds that the client did not report.
    pub missing_on_client: Vec<EntityId>,
    /// Ids the client reported that the server has no record of — a prior
    /// push that never landed.
    pub missing_on_server: Vec<EntityId>,
}

impl HashVerificationResponse {
    /// Creates a response; status reflects whether any divergence exists.
    pub fn new(
        conflicts: Vec<HashMismatch>,
        missing_on_client: Vec<EntityId>,
        missing_on_server: Vec<EntityId>,
    ) -> Self {
        let status = if conflicts.is_empty()
            && missing_on_client.is_empty()
            && missing_on_server.is_empty()
        {
            BatchStatus::Ok
        } else {
            BatchStatus::Partial
        };
        Self {
            status,
            conflicts,
            missing_on_client,
            missing_on_server,
        }
    }

    /// Returns true if client and server state fully agree.
    pub fn is_clean(&self) -> bool {
        self.status == BatchStatus::Ok
    }
}
