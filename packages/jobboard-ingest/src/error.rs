//! Typed errors for the ingestion engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur while fetching remote content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transient network failure (connect error, timeout, 5xx, 429).
    ///
    /// Retried inside `ResilientClient` up to the configured attempt bound.
    #[error("transient network error: {0}")]
    Transient(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response arrived but its body is structurally malformed.
    ///
    /// Never retried: the same request would produce the same body.
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// Non-success HTTP status that is not worth retrying (4xx other than 429).
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Connection timeout
    #[error("timeout fetching: {url}")]
    Timeout { url: String },
}

impl FetchError {
    /// Whether the error may resolve on its own and is safe to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Timeout { .. })
    }
}

/// A platform payload could not be parsed into a posting.
///
/// Fatal for that single URL only; sibling URLs in a dispatch batch
/// are unaffected.
#[derive(Debug, Error)]
#[error("parse failed for {url}: {reason}")]
pub struct ParseError {
    pub url: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A natural-key collision escaped the upsert contract.
    ///
    /// The idempotent upserts make this unreachable in correct code;
    /// seeing it means a write bypassed the upsert path.
    #[error("persistence conflict on {table}: {detail}")]
    Conflict { table: String, detail: String },

    /// Backend operation failed
    #[error("storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Backend(Box::new(err))
    }
}

/// Top-level error type for ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Fetch failed after the client exhausted its retries
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Payload could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Storage operation failed
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    /// No adapter registered for a platform named by a task
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
