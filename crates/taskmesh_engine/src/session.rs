//! Sync session state machine.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::queue::PendingQueue;
use crate::replica::ReplicaStore;
use crate::transport::SessionTransport;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmesh_model::{EntityId, EntityType, Timestamp};
use taskmesh_protocol::{
    ApplyResolvedDataRequest, ConflictResolutionRequest, FetchChangesRequest,
    HashVerificationRequest, HashVerificationResponse, SyncEventStatus,
};
use tracing::{debug, info, warn};

/// The current state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not syncing.
    Idle,
    /// Draining the pending event queue.
    Pushing,
    /// Exchanging hash lists with the server.
    Verifying,
    /// Submitting conflict resolution candidates.
    Resolving,
    /// Writing back resolved data and pulling winners.
    ApplyingResolution,
    /// The last session failed.
    Error,
    /// Waiting before a retry attempt.
    RetryWait,
}

impl SessionState {
    /// Returns true if a session step is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Pushing
                | SessionState::Verifying
                | SessionState::Resolving
                | SessionState::ApplyingResolution
        )
    }

    /// Returns true if a new session may start. A failed session restarts
    /// from the beginning of the push phase.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Error | SessionState::RetryWait
        )
    }
}

/// Statistics accumulated across sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Completed sync sessions.
    pub cycles_completed: u64,
    /// Events confirmed by the server.
    pub events_pushed: u64,
    /// Divergences detected during verification.
    pub conflicts_detected: u64,
    /// Resolutions the server applied.
    pub resolutions_applied: u64,
    /// Retry attempts performed.
    pub retries: u64,
    /// Last error message, if the last session failed.
    pub last_error: Option<String>,
}

/// Result of one sync session.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    /// Events the server confirmed.
    pub pushed: u64,
    /// Events that came back as conflicts and went to resolution.
    pub push_conflicts: u64,
    /// Events that errored and stay queued for the next session.
    pub push_errors: u64,
    /// Divergences reported by verification.
    pub conflicts_detected: u64,
    /// Resolutions the server applied.
    pub resolutions_applied: u64,
    /// Entities recovered via resolved-data write-back.
    pub recovered: u64,
    /// Entities pulled into the replica.
    pub fetched: u64,
    /// Whether the session ran to completion.
    pub success: bool,
    /// Wall-clock duration of the session.
    pub duration: Duration,
}

/// Runs sync sessions against a server.
///
/// One session walks the full sequence: drain the pending queue, verify
/// hashes per entity type, resolve reported conflicts (the server decides;
/// the client applies the same precedence rule locally so both converge),
/// write back entities the server never received, then pull all changes
/// past the replica's checkpoint.
pub struct SyncSession<T: SessionTransport, R: ReplicaStore> {
    config: SessionConfig,
    transport: Arc<T>,
    replica: Arc<R>,
    queue: Arc<PendingQueue>,
    state: RwLock<SessionState>,
    stats: RwLock<SessionStats>,
    cancelled: AtomicBool,
}

impl<T: SessionTransport, R: ReplicaStore> SyncSession<T, R> {
    /// Creates a session runner with an empty pending queue.
    pub fn new(config: SessionConfig, transport: T, replica: R) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            replica: Arc::new(replica),
            queue: Arc::new(PendingQueue::new()),
            state: RwLock::new(SessionState::Idle),
            stats: RwLock::new(SessionStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the pending queue for enqueuing local mutations.
    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    /// Returns the replica store.
    pub fn replica(&self) -> &Arc<R> {
        &self.replica
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns a copy of the accumulated statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Requests cancellation of an in-flight session.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SessionResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    fn handle_error(&self, error: &SessionError) {
        self.set_state(SessionState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Runs one full sync session.
    pub fn sync(&self) -> SessionResult<SessionOutcome> {
        let start = Instant::now();
        self.reset_cancel();

        if !self.state().can_start() {
            return Err(SessionError::InvalidStateTransition {
                from: format!("{:?}", self.state()),
                to: "Pushing".into(),
            });
        }

        let mut outcome = SessionOutcome::default();
        let result = self.run_phases(&mut outcome);
        outcome.duration = start.elapsed();

        match result {
            Ok(()) => {
                outcome.success = true;
                self.set_state(SessionState::Idle);

                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.events_pushed += outcome.pushed;
                stats.conflicts_detected += outcome.conflicts_detected;
                stats.resolutions_applied += outcome.resolutions_applied;
                stats.last_error = None;
                drop(stats);

                info!(
                    pushed = outcome.pushed,
                    conflicts = outcome.conflicts_detected,
                    fetched = outcome.fetched,
                    "session completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    /// Runs sessions until one succeeds or the retry budget is spent.
    pub fn sync_with_retry(&self) -> SessionResult<SessionOutcome> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                self.set_state(SessionState::RetryWait);
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            self.check_cancelled()?;

            match self.sync() {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    warn!(error = %e, attempt, "session failed, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| SessionError::Protocol("no attempts made".into())))
    }

    fn run_phases(&self, outcome: &mut SessionOutcome) -> SessionResult<()> {
        self.set_state(SessionState::Pushing);
        self.push_pending(outcome)?;
        self.check_cancelled()?;

        self.set_state(SessionState::Verifying);
        let reports = self.verify_all()?;
        outcome.conflicts_detected = reports
            .iter()
            .map(|(_, report)| report.conflicts.len() as u64)
            .sum();
        self.check_cancelled()?;

        self.set_state(SessionState::Resolving);
        self.resolve(&reports, outcome)?;
        self.check_cancelled()?;

        self.set_state(SessionState::ApplyingResolution);
        self.apply_resolution(&reports, outcome)?;
        Ok(())
    }

    /// Drains the pending queue in causal order.
    ///
    /// An event that errors stays queued and blocks later events targeting
    /// the same entity, so per-entity order survives partial failure.
    fn push_pending(&self, outcome: &mut SessionOutcome) -> SessionResult<()> {
        let mut blocked: HashSet<(EntityType, EntityId)> = HashSet::new();

        loop {
            let batch = self.queue.batch(self.config.push_batch_size as usize);
            if batch.is_empty() {
                break;
            }

            let mut progressed = false;
            for queued in batch {
                self.check_cancelled()?;

                if let Some(id) = queued.event.entity_id {
                    if blocked.contains(&(queued.event.entity_type, id)) {
                        continue;
                    }
                }

                let response = self.transport.push_event(&queued.event)?;
                match response.status {
                    SyncEventStatus::Confirmed => {
                        self.queue.acknowledge(queued.seq);
                        outcome.pushed += 1;
                        progressed = true;
                    }
                    SyncEventStatus::Conflict => {
                        // The event is consumed; the divergence is picked up
                        // again by verification and resolved there.
                        self.queue.acknowledge(queued.seq);
                        outcome.push_conflicts += 1;
                        progressed = true;
                        debug!(entity_id = ?response.entity_id, "push conflicted");
                    }
                    SyncEventStatus::Error => {
                        outcome.push_errors += 1;
                        if let Some(id) = queued.event.entity_id {
                            blocked.insert((queued.event.entity_type, id));
                        }
                        warn!(
                            entity_id = ?queued.event.entity_id,
                            message = ?response.message,
                            "event failed, staying queued"
                        );
                    }
                }
            }

            if !progressed {
                break;
            }
        }
        Ok(())
    }

    /// Sends the replica's hash lists, one request per entity type.
    fn verify_all(&self) -> SessionResult<Vec<(EntityType, HashVerificationResponse)>> {
        let mut reports = Vec::new();
        for entity_type in EntityType::ALL {
            self.check_cancelled()?;
            let hashes = self.replica.digests(entity_type)?;
            let response = self
                .transport
                .verify_hashes(&HashVerificationRequest::new(entity_type, hashes))?;
            reports.push((entity_type, response));
        }
        Ok(reports)
    }

    /// Submits local candidates and applies each winner to the replica.
    ///
    /// The server is authoritative; the client evaluates the identical
    /// rule (later `updated_at` wins, ties to the server) so both sides
    /// land on the same state without another round trip.
    fn resolve(
        &self,
        reports: &[(EntityType, HashVerificationResponse)],
        outcome: &mut SessionOutcome,
    ) -> SessionResult<()> {
        for (entity_type, report) in reports {
            if report.conflicts.is_empty() {
                continue;
            }

            let mut candidates = Vec::new();
            for mismatch in &report.conflicts {
                if let Some(local) = self.replica.get(*entity_type, mismatch.id)? {
                    candidates.push(local);
                }
            }

            if !candidates.is_empty() {
                let response = self
                    .transport
                    .resolve_conflicts(&ConflictResolutionRequest::new(
                        *entity_type,
                        candidates,
                    ))?;
                outcome.resolutions_applied += response.applied.len() as u64;
                for failure in &response.failed {
                    warn!(id = %failure.id, error = %failure.error, "resolution failed");
                }
            }

            for mismatch in &report.conflicts {
                let adopt_server = match self.replica.get(*entity_type, mismatch.id)? {
                    Some(local) => {
                        local.updated_at() <= mismatch.server_entity.updated_at()
                    }
                    None => true,
                };
                if adopt_server {
                    self.replica.put(mismatch.server_entity.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Writes back entities the server never received, then pulls all
    /// changes past the replica's checkpoint. Both halves are re-entrant,
    /// so a session that dies here redoes them safely.
    fn apply_resolution(
        &self,
        reports: &[(EntityType, HashVerificationResponse)],
        outcome: &mut SessionOutcome,
    ) -> SessionResult<()> {
        for (entity_type, report) in reports {
            if report.missing_on_server.is_empty() {
                continue;
            }

            let mut payloads = Vec::new();
            for id in &report.missing_on_server {
                if let Some(entity) = self.replica.get(*entity_type, *id)? {
                    payloads.push(entity);
                }
            }
            if payloads.is_empty() {
                continue;
            }

            let response = self
                .transport
                .apply_resolved(&ApplyResolvedDataRequest::new(*entity_type, payloads))?;
            outcome.recovered += response.applied.len() as u64;
            for failure in &response.failed {
                warn!(id = %failure.id, error = %failure.error, "write-back failed");
            }
        }

        // Entities the server holds but the client never reported may sit
        // behind the fetch checkpoint (a late-arriving push with an old
        // timestamp). Rewinding the checkpoint makes the sweep pick them up.
        for (entity_type, report) in reports {
            if !report.missing_on_client.is_empty() {
                self.replica.set_checkpoint(*entity_type, Timestamp::EPOCH)?;
            }
        }

        for entity_type in EntityType::ALL {
            loop {
                self.check_cancelled()?;

                let since = self.replica.checkpoint(entity_type)?;
                let response = self.transport.fetch_changes(&FetchChangesRequest::new(
                    entity_type,
                    since,
                    self.config.fetch_batch_size,
                ))?;

                let count = response.entities.len();
                for entity in response.entities {
                    let adopt = match self.replica.get(entity_type, entity.id())? {
                        Some(local) => local.updated_at() <= entity.updated_at(),
                        None => true,
                    };
                    if adopt {
                        self.replica.put(entity)?;
                    }
                }
                self.replica.set_checkpoint(entity_type, response.checkpoint)?;
                outcome.fetched += count as u64;

                if !response.has_more || (count == 0 && response.checkpoint == since) {
                    break;
                }
            }
        }
        Ok(())
    }
}
