//! Engine and HTTP client configuration.
//!
//! Consumed, not owned: callers build these from their own settings
//! source and hand them to component constructors. No global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for discovery and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Flush the pending URL batch once it reaches this many rows
    pub upload_batch_size: usize,

    /// Stop a category crawl after discovering this many URLs
    pub url_limit: usize,

    /// Maximum URLs one dispatch cycle claims
    pub dispatch_batch_size: u32,

    /// Consecutive equal discovered-count snapshots that end a crawl
    pub stall_window: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_batch_size: 50,
            url_limit: 10_000,
            dispatch_batch_size: 20,
            stall_window: 4,
        }
    }
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_batch_size(mut self, size: usize) -> Self {
        self.upload_batch_size = size;
        self
    }

    pub fn with_url_limit(mut self, limit: usize) -> Self {
        self.url_limit = limit;
        self
    }

    pub fn with_dispatch_batch_size(mut self, size: u32) -> Self {
        self.dispatch_batch_size = size;
        self
    }

    pub fn with_stall_window(mut self, window: usize) -> Self {
        self.stall_window = window;
        self
    }
}

/// Tunables for the resilient HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Politeness delay before each request is drawn uniformly
    /// from `[min_delay, max_delay]`
    pub min_delay: Duration,
    pub max_delay: Duration,

    /// Total attempts per request, first try included
    pub max_attempts: u32,

    /// First retry waits this long; each further retry doubles it
    pub base_backoff: Duration,

    /// Ceiling for the doubled backoff delay
    pub max_backoff: Duration,

    /// Per-request timeout handed to the transport
    pub request_timeout: Duration,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            user_agent: "jobboard-ingest/0.1".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
