//! Server configuration.

use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum `{id, hash}` pairs accepted per verification request.
    pub max_verify_batch: u32,
    /// Maximum candidates accepted per resolution or write-back request.
    pub max_resolution_batch: u32,
    /// Maximum entities returned per change fetch.
    pub max_fetch_batch: u32,
    /// Per-step timeout the embedding transport should enforce. A step
    /// that exceeds it is failed-safe: nothing partial persists and the
    /// client retries idempotently.
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_verify_batch: 1000,
            max_resolution_batch: 200,
            max_fetch_batch: 100,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the maximum verification batch size.
    pub fn with_max_verify_batch(mut self, size: u32) -> Self {
        self.max_verify_batch = size;
        self
    }

    /// Sets the maximum resolution batch size.
    pub fn with_max_resolution_batch(mut self, size: u32) -> Self {
        self.max_resolution_batch = size;
        self
    }

    /// Sets the maximum fetch batch size.
    pub fn with_max_fetch_batch(mut self, size: u32) -> Self {
        self.max_fetch_batch = size;
        self
    }

    /// Sets the per-step request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
