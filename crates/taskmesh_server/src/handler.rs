//! Request handlers for the sync session steps.

use crate::applier::EventApplier;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::resolver::ConflictResolver;
use std::sync::Arc;
use taskmesh_protocol::{
    ApplyResolvedDataRequest, ApplyResolvedDataResponse, ConflictResolutionRequest,
    ConflictResolutionResponse, FetchChangesRequest, FetchChangesResponse,
    HashVerificationRequest, HashVerificationResponse, SyncEvent, SyncEventResponse,
};
use taskmesh_store::{Clock, EntityStore};

/// Handles the session-facing calls an embedding transport delegates to.
///
/// Each handler is a short-lived unit of work: no per-client state is kept
/// between calls, so any step may be retried after a timeout or restarted
/// from the beginning of the session. Batch-size caps are the only
/// request-level validation; everything per-item reports inline.
pub struct RequestHandler {
    config: ServerConfig,
    store: Arc<EntityStore>,
    applier: EventApplier,
    resolver: ConflictResolver,
}

impl RequestHandler {
    /// Creates a handler over the given store and clock.
    pub fn new(config: ServerConfig, store: Arc<EntityStore>, clock: Arc<dyn Clock>) -> Self {
        let applier = EventApplier::new(Arc::clone(&store));
        let resolver = ConflictResolver::new(Arc::clone(&store), clock);
        Self {
            config,
            store,
            applier,
            resolver,
        }
    }

    /// Applies one pushed event. Failures report inline in the response.
    pub fn handle_push_event(&self, event: &SyncEvent) -> SyncEventResponse {
        self.applier.apply(event)
    }

    /// Verifies a client's hash list. Idempotent and safe to retry.
    pub fn handle_verify_hashes(
        &self,
        request: &HashVerificationRequest,
    ) -> ServerResult<HashVerificationResponse> {
        if request.hashes.len() > self.config.max_verify_batch as usize {
            return Err(ServerError::InvalidRequest(format!(
                "too many hashes: {} > {}",
                request.hashes.len(),
                self.config.max_verify_batch
            )));
        }
        self.resolver.verify(request)
    }

    /// Resolves a batch of conflicts against server state.
    pub fn handle_resolve_conflicts(
        &self,
        request: &ConflictResolutionRequest,
    ) -> ServerResult<ConflictResolutionResponse> {
        if request.resolutions.len() > self.config.max_resolution_batch as usize {
            return Err(ServerError::InvalidRequest(format!(
                "too many resolutions: {} > {}",
                request.resolutions.len(),
                self.config.max_resolution_batch
            )));
        }
        Ok(self.resolver.apply_resolutions(request))
    }

    /// Writes back resolved payloads. Re-entrant per entity.
    pub fn handle_apply_resolved(
        &self,
        request: &ApplyResolvedDataRequest,
    ) -> ServerResult<ApplyResolvedDataResponse> {
        if request.resolved_data.len() > self.config.max_resolution_batch as usize {
            return Err(ServerError::InvalidRequest(format!(
                "too many payloads: {} > {}",
                request.resolved_data.len(),
                self.config.max_resolution_batch
            )));
        }
        Ok(self.resolver.apply_resolved(request))
    }

    /// Returns entities changed since the client's checkpoint.
    pub fn handle_fetch_changes(
        &self,
        request: &FetchChangesRequest,
    ) -> ServerResult<FetchChangesResponse> {
        let limit = request.limit.min(self.config.max_fetch_batch) as usize;
        let (entities, has_more) =
            self.store
                .changed_since(request.entity_type, request.since, limit);
        let checkpoint = entities
            .last()
            .map(|entity| entity.updated_at())
            .unwrap_or(request.since);

        Ok(FetchChangesResponse::new(entities, checkpoint, has_more))
    }
}
