//! In-memory storage implementation for testing and development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::traits::Storage;
use crate::types::{
    Category, CrawlStatus, JobPosting, ListingUrl, Platform, UrlCategory,
};

#[derive(Default)]
struct Inner {
    categories: HashMap<(Platform, String), Category>,
    urls: HashMap<String, ListingUrl>,
    url_categories: HashMap<(String, String), UrlCategory>,
    postings: HashMap<(Platform, String), JobPosting>,
}

/// In-memory storage for categories, URLs, associations and postings.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart. A single mutex guards all tables, which
/// makes the dispatch claim trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
    }

    /// Number of stored URL rows.
    pub fn url_count(&self) -> usize {
        self.inner.lock().unwrap().urls.len()
    }

    /// Number of stored association rows.
    pub fn association_count(&self) -> usize {
        self.inner.lock().unwrap().url_categories.len()
    }

    /// Number of stored postings.
    pub fn posting_count(&self) -> usize {
        self.inner.lock().unwrap().postings.len()
    }

    /// Number of stored categories across all platforms.
    pub fn category_count(&self) -> usize {
        self.inner.lock().unwrap().categories.len()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn categories_for_platform(&self, platform: &Platform) -> StorageResult<Vec<Category>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .categories
            .values()
            .filter(|c| &c.platform == platform)
            .cloned()
            .collect())
    }

    async fn upsert_categories(&self, rows: &[Category]) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        for row in rows {
            let key = (row.platform.clone(), row.category_id.clone());
            inner
                .categories
                .entry(key)
                .and_modify(|existing| {
                    // UPDATE_COLUMNS: name, parent_id
                    existing.name = row.name.clone();
                    existing.parent_id = row.parent_id.clone();
                })
                .or_insert_with(|| row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_urls(&self, rows: &[ListingUrl]) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        for row in rows {
            inner
                .urls
                .entry(row.source_url.clone())
                .and_modify(|existing| {
                    // UPDATE_COLUMNS: status, updated_at. Re-discovery must
                    // not touch crawl_status or the discovery timestamp.
                    existing.status = row.status;
                    existing.updated_at = Utc::now();
                })
                .or_insert_with(|| row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_url_categories(&self, rows: &[UrlCategory]) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut inserted = 0;
        for row in rows {
            let key = (row.source_url.clone(), row.category_id.clone());
            // Empty update set: collisions are silent no-ops.
            if let std::collections::hash_map::Entry::Vacant(entry) =
                inner.url_categories.entry(key)
            {
                entry.insert(row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn upsert_posting(&self, posting: &JobPosting) -> StorageResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let key = (posting.platform.clone(), posting.source_id.clone());
        inner
            .postings
            .entry(key)
            .and_modify(|existing| {
                let mut updated = posting.clone();
                updated.updated_at = Utc::now();
                *existing = updated;
            })
            .or_insert_with(|| posting.clone());
        Ok(1)
    }

    async fn claim_for_dispatch(
        &self,
        platform: &Platform,
        limit: u32,
    ) -> StorageResult<Vec<ListingUrl>> {
        let mut inner = self.inner.lock().unwrap();
        let mut eligible: Vec<(DateTime<Utc>, String)> = inner
            .urls
            .values()
            .filter(|u| &u.platform == platform && u.crawl_status.is_claimable())
            .map(|u| (u.updated_at, u.source_url.clone()))
            .collect();
        eligible.sort();
        eligible.truncate(limit as usize);

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(eligible.len());
        for (_, url) in eligible {
            if let Some(row) = inner.urls.get_mut(&url) {
                row.crawl_status = CrawlStatus::Queued;
                row.updated_at = now;
                claimed.push(row.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_crawl_status(
        &self,
        source_url: &str,
        status: CrawlStatus,
    ) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.urls.get_mut(source_url) else {
            return Ok(false);
        };
        // Success is sticky: a downgrade is a no-op, not an error.
        if row.crawl_status.is_terminal() {
            return Ok(false);
        }
        row.crawl_status = status;
        row.updated_at = Utc::now();
        if status == CrawlStatus::Success {
            row.details_crawled_at = Some(row.updated_at);
        }
        Ok(true)
    }

    async fn get_url(&self, source_url: &str) -> StorageResult<Option<ListingUrl>> {
        Ok(self.inner.lock().unwrap().urls.get(source_url).cloned())
    }

    async fn get_posting(
        &self,
        platform: &Platform,
        source_id: &str,
    ) -> StorageResult<Option<JobPosting>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .postings
            .get(&(platform.clone(), source_id.to_string()))
            .cloned())
    }

    async fn categories_for_url(&self, source_url: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .url_categories
            .values()
            .filter(|uc| uc.source_url == source_url)
            .map(|uc| uc.category_id.clone())
            .collect())
    }

    async fn stale_urls(
        &self,
        platform: &Platform,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> StorageResult<Vec<ListingUrl>> {
        let inner = self.inner.lock().unwrap();
        let mut stale: Vec<ListingUrl> = inner
            .urls
            .values()
            .filter(|u| {
                &u.platform == platform
                    && u.details_crawled_at.map_or(true, |at| at < older_than)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|u| u.details_crawled_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}
