//! Main sync server facade.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::RequestHandler;
use std::sync::Arc;
use taskmesh_model::EntityType;
use taskmesh_protocol::{
    ApplyResolvedDataRequest, ApplyResolvedDataResponse, ConflictResolutionRequest,
    ConflictResolutionResponse, FetchChangesRequest, FetchChangesResponse,
    HashVerificationRequest, HashVerificationResponse, SyncEvent, SyncEventResponse,
};
use taskmesh_store::{Clock, EntityStore, SystemClock};

/// The sync server.
///
/// Handles synchronization requests from clients over the TaskMesh
/// protocol. All state lives in the shared entity store; an embedding
/// HTTP layer only needs to deserialize requests and delegate here.
///
/// # Example
///
/// ```
/// use taskmesh_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
///
/// // In a real deployment, HTTP endpoints call server.handle_push_event(),
/// // handle_verify_hashes(), handle_resolve_conflicts(),
/// // handle_apply_resolved() and handle_fetch_changes().
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    store: Arc<EntityStore>,
}

impl SyncServer {
    /// Creates a sync server with a fresh store and the system clock.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(EntityStore::new()), Arc::new(SystemClock))
    }

    /// Creates a sync server over an existing store and clock.
    pub fn with_store(
        config: ServerConfig,
        store: Arc<EntityStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let handler = RequestHandler::new(config, Arc::clone(&store), clock);
        Self { handler, store }
    }

    /// Applies one pushed event.
    pub fn handle_push_event(&self, event: &SyncEvent) -> SyncEventResponse {
        self.handler.handle_push_event(event)
    }

    /// Verifies a client's hash list.
    pub fn handle_verify_hashes(
        &self,
        request: &HashVerificationRequest,
    ) -> ServerResult<HashVerificationResponse> {
        self.handler.handle_verify_hashes(request)
    }

    /// Resolves a batch of conflicts.
    pub fn handle_resolve_conflicts(
        &self,
        request: &ConflictResolutionRequest,
    ) -> ServerResult<ConflictResolutionResponse> {
        self.handler.handle_resolve_conflicts(request)
    }

    /// Writes back resolved payloads.
    pub fn handle_apply_resolved(
        &self,
        request: &ApplyResolvedDataRequest,
    ) -> ServerResult<ApplyResolvedDataResponse> {
        self.handler.handle_apply_resolved(request)
    }

    /// Returns entities changed since the client's checkpoint.
    pub fn handle_fetch_changes(
        &self,
        request: &FetchChangesRequest,
    ) -> ServerResult<FetchChangesResponse> {
        self.handler.handle_fetch_changes(request)
    }

    /// Returns the shared entity store.
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Returns the number of rows held for an entity type.
    pub fn entity_count(&self, entity_type: EntityType) -> usize {
        self.store.len(entity_type)
    }
}
