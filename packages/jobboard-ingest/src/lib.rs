//! Crawl orchestration and idempotent ingestion engine for job-board
//! platforms.
//!
//! The engine owns the hard part of multi-platform ingestion — staying
//! correct under partial failures, rate limits and at-least-once task
//! delivery — while everything platform-specific (endpoints, payload
//! shapes, field extraction) lives behind the [`PlatformAdapter`] trait.
//!
//! # Design
//!
//! - Every write is an idempotent upsert over a natural key; re-running
//!   any unit of work is always safe.
//! - Each discovered URL moves through a small state machine
//!   (`Pending → Queued → Success | Failed`) whose claim step is the
//!   single atomic operation in the system.
//! - Discovery pagination is bounded by explicit termination heuristics,
//!   including a stall window for sources that loop instead of ending.
//! - Outbound HTTP is smoothed with jittered delays and retried with
//!   bounded exponential backoff.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jobboard_ingest::{
//!     IngestConfig, IngestEngine, MemoryStore, Task, WorkerPool, task_channel,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(MemoryStore::new());
//! let engine = Arc::new(
//!     IngestEngine::new(store, IngestConfig::default())
//!         .register(Arc::new(my_platform_adapter)),
//! );
//!
//! let (tasks, receiver) = task_channel(64);
//! tasks.send(Task::SyncCategories { platform: "boardone".into() }).await?;
//!
//! WorkerPool::new(4)
//!     .run(engine, receiver, CancellationToken::new())
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (PlatformAdapter, Storage)
//! - [`types`] - Domain entities and status machines
//! - [`http`] - Resilient HTTP client (jitter + bounded backoff)
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`sync`] - Category-tree synchronization
//! - [`discovery`] - Paginated URL discovery
//! - [`ledger`] - Crawl-status state machine
//! - [`dispatch`] - Detail fetch dispatch
//! - [`tasks`] - Task messages and the worker pool
//! - [`testing`] - Scripted mocks for tests

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ledger;
pub mod stores;
pub mod sync;
pub mod tasks;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::{ClientConfig, IngestConfig};
pub use discovery::{DiscoveryCrawler, DiscoveryOutcome, StopReason};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{FetchError, IngestError, ParseError, Result, StorageError};
pub use http::{Method, ResilientClient, Transport};
pub use ledger::CrawlLedger;
pub use stores::MemoryStore;
pub use sync::{CategorySynchronizer, SyncOutcome};
pub use tasks::{task_channel, IngestEngine, Task, WorkerPool};
pub use traits::{PlatformAdapter, Storage};
pub use types::{
    Category, CrawlStatus, JobPosting, ListingPage, ListingStatus, ListingUrl, Platform,
    RawPayload, RemoteCategory, UrlCategory,
};

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;
