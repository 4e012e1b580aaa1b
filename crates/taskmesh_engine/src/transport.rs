//! Transport layer abstraction for the sync session.

use crate::error::{SessionError, SessionResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use taskmesh_protocol::{
    ApplyResolvedDataRequest, ApplyResolvedDataResponse, ConflictResolutionRequest,
    ConflictResolutionResponse, FetchChangesRequest, FetchChangesResponse,
    HashVerificationRequest, HashVerificationResponse, SyncEvent, SyncEventResponse,
};

/// Handles network communication with the sync server.
///
/// This trait abstracts the wire so different implementations (HTTP, an
/// in-process loopback, a mock for tests) plug into the same session.
pub trait SessionTransport: Send + Sync {
    /// Pushes one queued event.
    fn push_event(&self, event: &SyncEvent) -> SessionResult<SyncEventResponse>;

    /// Verifies a hash list.
    fn verify_hashes(
        &self,
        request: &HashVerificationRequest,
    ) -> SessionResult<HashVerificationResponse>;

    /// Submits conflict resolution candidates.
    fn resolve_conflicts(
        &self,
        request: &ConflictResolutionRequest,
    ) -> SessionResult<ConflictResolutionResponse>;

    /// Writes back resolved payloads.
    fn apply_resolved(
        &self,
        request: &ApplyResolvedDataRequest,
    ) -> SessionResult<ApplyResolvedDataResponse>;

    /// Fetches changes since a checkpoint.
    fn fetch_changes(&self, request: &FetchChangesRequest)
        -> SessionResult<FetchChangesResponse>;

    /// Returns true if the transport is usable.
    fn is_connected(&self) -> bool;
}

/// A mock transport for tests.
///
/// Push responses drain from a queue (one per pushed event); the other
/// calls return a settable response.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    push_responses: Mutex<VecDeque<SyncEventResponse>>,
    verify_response: Mutex<Option<HashVerificationResponse>>,
    resolve_response: Mutex<Option<ConflictResolutionResponse>>,
    apply_response: Mutex<Option<ApplyResolvedDataResponse>>,
    fetch_response: Mutex<Option<FetchChangesResponse>>,
}

impl MockTransport {
    /// Creates a connected mock with no responses set.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues responses for pushed events, drained in order.
    pub fn queue_push_responses(&self, responses: Vec<SyncEventResponse>) {
        self.push_responses.lock().extend(responses);
    }

    /// Sets the verification response.
    pub fn set_verify_response(&self, response: HashVerificationResponse) {
        *self.verify_response.lock() = Some(response);
    }

    /// Sets the resolution response.
    pub fn set_resolve_response(&self, response: ConflictResolutionResponse) {
        *self.resolve_response.lock() = Some(response);
    }

    /// Sets the write-back response.
    pub fn set_apply_response(&self, response: ApplyResolvedDataResponse) {
        *self.apply_response.lock() = Some(response);
    }

    /// Sets the fetch response.
    pub fn set_fetch_response(&self, response: FetchChangesResponse) {
        *self.fetch_response.lock() = Some(response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn check_connected(&self) -> SessionResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::transport_retryable("not connected"))
        }
    }
}

impl SessionTransport for MockTransport {
    fn push_event(&self, _event: &SyncEvent) -> SessionResult<SyncEventResponse> {
        self.check_connected()?;
        self.push_responses
            .lock()
            .pop_front()
            .ok_or_else(|| SessionError::Protocol("no mock push response queued".into()))
    }

    fn verify_hashes(
        &self,
        _request: &HashVerificationRequest,
    ) -> SessionResult<HashVerificationResponse> {
        self.check_connected()?;
        self.verify_response
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Protocol("no mock verify response set".into()))
    }

    fn resolve_conflicts(
        &self,
        _request: &ConflictResolutionRequest,
    ) -> SessionResult<ConflictResolutionResponse> {
        self.check_connected()?;
        self.resolve_response
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Protocol("no mock resolve response set".into()))
    }

    fn apply_resolved(
        &self,
        _request: &ApplyResolvedDataRequest,
    ) -> SessionResult<ApplyResolvedDataResponse> {
        self.check_connected()?;
        self.apply_response
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Protocol("no mock apply response set".into()))
    }

    fn fetch_changes(
        &self,
        _request: &FetchChangesRequest,
    ) -> SessionResult<FetchChangesResponse> {
        self.check_connected()?;
        self.fetch_response
            .lock()
            .clone()
            .ok_or_else(|| SessionError::Protocol("no mock fetch response set".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
