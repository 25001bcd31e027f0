//! Core trait abstractions: platform adapters and storage backends.
//!
//! Every external collaborator sits behind a trait so tests can substitute
//! scripted implementations without network or database access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{FetchResult, ParseError, StorageResult};
use crate::types::{
    Category, CrawlStatus, JobPosting, ListingPage, ListingUrl, Platform, RawPayload,
    RemoteCategory, UrlCategory,
};

/// Fetch/parse collaborator pair for one job-board platform.
///
/// The engine owns orchestration — pagination, status bookkeeping,
/// persistence, retries — while the adapter owns everything
/// platform-specific: endpoint URLs, payload shapes, field extraction.
///
/// Implement this once per platform; the synchronizer, discovery crawler
/// and dispatcher are generic over it.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Which platform this adapter speaks for.
    fn platform(&self) -> Platform;

    /// Page number the platform's listings start at (0 or 1, typically).
    fn first_page(&self) -> u32 {
        1
    }

    /// Fetch the platform's full category taxonomy.
    async fn fetch_category_tree(&self) -> FetchResult<Vec<RemoteCategory>>;

    /// Fetch one page of a category's listing and extract detail URLs.
    async fn fetch_listing_page(&self, category_id: &str, page: u32) -> FetchResult<ListingPage>;

    /// Fetch the raw detail payload for one discovered URL.
    async fn fetch_detail(&self, source_url: &str) -> FetchResult<RawPayload>;

    /// Parse a raw detail payload into a normalized posting.
    fn parse_detail(&self, payload: &RawPayload) -> Result<JobPosting, ParseError>;

    /// Derive the platform's natural record id from a detail URL.
    ///
    /// Returns `None` when the URL does not carry one; the dispatcher
    /// treats that as a parse-class failure for that URL.
    fn record_id_for(&self, source_url: &str) -> Option<String>;
}

/// Persistence backend for the ingestion engine.
///
/// All writes are idempotent upserts over each entity's natural key:
/// insert when the key is absent, otherwise update exactly the entity's
/// `UPDATE_COLUMNS` and leave every other column untouched. Calling an
/// upsert N times with identical rows leaves the same stored state as
/// calling it once.
#[async_trait]
pub trait Storage: Send + Sync {
    /// All stored categories for a platform.
    async fn categories_for_platform(&self, platform: &Platform) -> StorageResult<Vec<Category>>;

    /// Upsert category rows. Returns the number of rows written.
    async fn upsert_categories(&self, rows: &[Category]) -> StorageResult<u64>;

    /// Upsert discovered URLs.
    ///
    /// Existing rows keep their `crawl_status` — re-discovery refreshes
    /// listing liveness only.
    async fn upsert_urls(&self, rows: &[ListingUrl]) -> StorageResult<u64>;

    /// Upsert URL/category association rows. Collisions are no-ops.
    async fn upsert_url_categories(&self, rows: &[UrlCategory]) -> StorageResult<u64>;

    /// Upsert one normalized posting.
    async fn upsert_posting(&self, posting: &JobPosting) -> StorageResult<u64>;

    /// Atomically claim up to `limit` URLs in `{Pending, Failed}` for a
    /// platform, flipping them to `Queued`.
    ///
    /// The flip must be a single conditional update: two concurrent
    /// dispatch cycles can never claim the same URL.
    async fn claim_for_dispatch(
        &self,
        platform: &Platform,
        limit: u32,
    ) -> StorageResult<Vec<ListingUrl>>;

    /// Record a crawl-status transition for one URL.
    ///
    /// Backends must keep `Success` sticky: a write that would downgrade
    /// a successful URL is a no-op. Returns whether a row changed.
    async fn mark_crawl_status(
        &self,
        source_url: &str,
        status: CrawlStatus,
    ) -> StorageResult<bool>;

    /// Look up one URL row.
    async fn get_url(&self, source_url: &str) -> StorageResult<Option<ListingUrl>>;

    /// Look up one posting by natural key.
    async fn get_posting(
        &self,
        platform: &Platform,
        source_id: &str,
    ) -> StorageResult<Option<JobPosting>>;

    /// Which categories reference a URL.
    async fn categories_for_url(&self, source_url: &str) -> StorageResult<Vec<String>>;

    /// URLs whose details were last crawled before `older_than`
    /// (or never), oldest first, bounded by `limit`.
    async fn stale_urls(
        &self,
        platform: &Platform,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<ListingUrl>>;
}
