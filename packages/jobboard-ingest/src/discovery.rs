//! Paginated URL discovery over a category listing.
//!
//! Walks listing pages, de-dups discovered URLs, flushes batched
//! upserts, and stops on the first termination heuristic to fire.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::traits::{PlatformAdapter, Storage};
use crate::types::{ListingUrl, UrlCategory};

/// Which termination heuristic ended a category crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Configured URL limit reached
    UrlLimit,
    /// Listing page returned zero items
    EmptyPage,
    /// Page cursor reached the platform-reported max page
    MaxPage,
    /// No growth across a full trailing window of pages — the source is
    /// looping or serving a stale page instead of signaling emptiness
    Stalled,
    /// Cancellation was requested between pages
    Cancelled,
}

/// Result of one category crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Distinct URLs discovered this run
    pub discovered: usize,
    /// Listing pages fetched
    pub pages_fetched: u32,
    pub stop: StopReason,
}

/// Crawls one category listing at a time, writing URL and association
/// rows through the idempotent persistence layer.
///
/// A page-fetch error aborts the run; batches flushed before the error
/// stay valid and re-invocation is safe.
pub struct DiscoveryCrawler<S> {
    adapter: Arc<dyn PlatformAdapter>,
    storage: Arc<S>,
    config: IngestConfig,
}

impl<S: Storage> DiscoveryCrawler<S> {
    pub fn new(adapter: Arc<dyn PlatformAdapter>, storage: Arc<S>, config: IngestConfig) -> Self {
        Self {
            adapter,
            storage,
            config,
        }
    }

    /// Crawl a category until a termination heuristic fires, using the
    /// configured URL limit.
    pub async fn crawl_category(
        &self,
        category_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryOutcome> {
        self.crawl_category_with_limit(category_id, self.config.url_limit, cancel)
            .await
    }

    /// Crawl a category with an explicit URL limit.
    pub async fn crawl_category_with_limit(
        &self,
        category_id: &str,
        url_limit: usize,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryOutcome> {
        let platform = self.adapter.platform();
        info!(
            platform = %platform,
            category_id = %category_id,
            url_limit,
            "Starting category crawl"
        );

        let mut page = self.adapter.first_page();
        let mut seen: HashSet<String> = HashSet::new();
        let mut window: VecDeque<usize> = VecDeque::with_capacity(self.config.stall_window);
        let mut pending_urls: Vec<ListingUrl> = Vec::new();
        let mut pending_assocs: Vec<UrlCategory> = Vec::new();
        let mut pages_fetched = 0u32;

        let stop = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let listing = self.adapter.fetch_listing_page(category_id, page).await?;
            pages_fetched += 1;

            if listing.is_empty() {
                break StopReason::EmptyPage;
            }

            for url in &listing.urls {
                if seen.insert(url.clone()) {
                    pending_urls.push(ListingUrl::discovered(platform.clone(), url.clone()));
                }
                // Every link joins the association batch, already-seen or
                // not: a URL can sit under several categories.
                pending_assocs.push(UrlCategory::new(url.clone(), category_id));

                if pending_urls.len() >= self.config.upload_batch_size {
                    self.flush(&mut pending_urls, &mut pending_assocs).await?;
                }
            }
            debug!(
                category_id = %category_id,
                page,
                discovered = seen.len(),
                "Listing page processed"
            );

            if seen.len() >= url_limit {
                break StopReason::UrlLimit;
            }
            if let Some(max_page) = listing.max_page {
                if page >= max_page {
                    break StopReason::MaxPage;
                }
            }

            if window.len() == self.config.stall_window {
                window.pop_front();
            }
            window.push_back(seen.len());
            if window.len() == self.config.stall_window
                && window.iter().all(|&count| count == window[0])
            {
                break StopReason::Stalled;
            }

            page += 1;
        };

        if stop != StopReason::Cancelled {
            self.flush(&mut pending_urls, &mut pending_assocs).await?;
        }

        let outcome = DiscoveryOutcome {
            discovered: seen.len(),
            pages_fetched,
            stop,
        };
        info!(
            platform = %platform,
            category_id = %category_id,
            discovered = outcome.discovered,
            pages_fetched = outcome.pages_fetched,
            stop = ?outcome.stop,
            "Category crawl finished"
        );
        Ok(outcome)
    }

    async fn flush(
        &self,
        pending_urls: &mut Vec<ListingUrl>,
        pending_assocs: &mut Vec<UrlCategory>,
    ) -> Result<()> {
        if !pending_urls.is_empty() {
            self.storage.upsert_urls(pending_urls).await?;
            pending_urls.clear();
        }
        if !pending_assocs.is_empty() {
            self.storage.upsert_url_categories(pending_assocs).await?;
            pending_assocs.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::MockAdapter;
    use crate::types::{CrawlStatus, ListingPage};

    fn crawler(adapter: MockAdapter, config: IngestConfig) -> (DiscoveryCrawler<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            DiscoveryCrawler::new(Arc::new(adapter), store.clone(), config),
            store,
        )
    }

    fn urls(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("http://b1.test/jobs/{i}")).collect()
    }

    #[tokio::test]
    async fn empty_page_ends_the_crawl() {
        let adapter = MockAdapter::new("boardone")
            .with_listing("c1", vec![ListingPage::new(urls(0..3)), ListingPage::default()]);
        let (crawler, store) = crawler(adapter, IngestConfig::default());

        let outcome = crawler
            .crawl_category("c1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::EmptyPage);
        assert_eq!(outcome.discovered, 3);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(store.url_count(), 3);
        assert_eq!(store.association_count(), 3);
        let stored = store.get_url("http://b1.test/jobs/0").await.unwrap().unwrap();
        assert_eq!(stored.crawl_status, CrawlStatus::Pending);
    }

    #[tokio::test]
    async fn repeating_final_page_trips_the_stall_window() {
        // Three growing pages, then the source repeats its final page
        // forever instead of returning empty.
        let adapter = MockAdapter::new("boardone")
            .with_listing(
                "c1",
                vec![
                    ListingPage::new(urls(0..4)),
                    ListingPage::new(urls(4..8)),
                    ListingPage::new(urls(8..12)),
                ],
            )
            .with_repeating_last_page("c1");
        let (crawler, store) = crawler(adapter, IngestConfig::default());

        let outcome = crawler
            .crawl_category("c1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::Stalled);
        assert_eq!(outcome.discovered, 12);
        // Growth stopped at page 3; the window needs at most
        // stall_window + 1 further pages to fill with equal snapshots.
        assert!(outcome.pages_fetched <= 3 + 4 + 1);
        assert_eq!(store.url_count(), 12);
    }

    #[tokio::test]
    async fn url_limit_wins_over_further_pages() {
        let adapter = MockAdapter::new("boardone").with_listing(
            "c1",
            vec![
                ListingPage::new(urls(0..4)),
                ListingPage::new(urls(4..8)),
                ListingPage::new(urls(8..12)),
            ],
        );
        let (crawler, store) = crawler(adapter, IngestConfig::default());

        let outcome = crawler
            .crawl_category_with_limit("c1", 5, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::UrlLimit);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(store.url_count(), 8);
    }

    #[tokio::test]
    async fn platform_reported_max_page_is_honored() {
        let adapter = MockAdapter::new("boardone").with_listing(
            "c1",
            vec![
                ListingPage::new(urls(0..4)).with_max_page(2),
                ListingPage::new(urls(4..8)).with_max_page(2),
                ListingPage::new(urls(8..12)).with_max_page(2),
            ],
        );
        let (crawler, store) = crawler(adapter, IngestConfig::default());

        let outcome = crawler
            .crawl_category("c1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.stop, StopReason::MaxPage);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(store.url_count(), 8);
    }

    #[tokio::test]
    async fn page_fetch_error_keeps_flushed_batches() {
        let adapter = MockAdapter::new("boardone")
            .with_listing("c1", vec![ListingPage::new(urls(0..4))])
            .with_listing_failure("c1", 1);
        let config = IngestConfig::default().with_upload_batch_size(2);
        let (crawler, store) = crawler(adapter, config);

        let result = crawler
            .crawl_category("c1", &CancellationToken::new())
            .await;

        assert!(result.is_err());
        // Two full batches of two were flushed before the page error.
        assert_eq!(store.url_count(), 4);

        // Re-invocation is safe: the same URLs upsert idempotently.
        let retry_adapter = MockAdapter::new("boardone")
            .with_listing("c1", vec![ListingPage::new(urls(0..4)), ListingPage::default()]);
        let crawler = DiscoveryCrawler::new(
            Arc::new(retry_adapter),
            store.clone(),
            IngestConfig::default(),
        );
        let outcome = crawler
            .crawl_category("c1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.stop, StopReason::EmptyPage);
        assert_eq!(store.url_count(), 4);
    }

    #[tokio::test]
    async fn shared_urls_join_both_categories() {
        let adapter = MockAdapter::new("boardone")
            .with_listing("c1", vec![ListingPage::new(urls(0..3)), ListingPage::default()])
            .with_listing("c2", vec![ListingPage::new(urls(2..5)), ListingPage::default()]);
        let (crawler, store) = crawler(adapter, IngestConfig::default());
        let cancel = CancellationToken::new();

        crawler.crawl_category("c1", &cancel).await.unwrap();
        crawler.crawl_category("c2", &cancel).await.unwrap();

        // jobs/2 exists once but belongs to both categories.
        assert_eq!(store.url_count(), 5);
        let categories = store
            .categories_for_url("http://b1.test/jobs/2")
            .await
            .unwrap();
        assert_eq!(categories.len(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_between_pages() {
        let adapter = MockAdapter::new("boardone")
            .with_listing("c1", vec![ListingPage::new(urls(0..3))])
            .with_repeating_last_page("c1");
        let (crawler, _store) = crawler(adapter, IngestConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = crawler.crawl_category("c1", &cancel).await.unwrap();

        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(outcome.pages_fetched, 0);
    }
}
