//! Detail fetch dispatch: claims discovered URLs and drives them to a
//! terminal crawl status.
//!
//! Failures are isolated per URL — one bad listing never aborts its
//! batch siblings. Anything that goes wrong surfaces as `Failed` on
//! that URL and the next dispatch cycle retries it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::{ParseError, Result};
use crate::ledger::CrawlLedger;
use crate::traits::{PlatformAdapter, Storage};
use crate::types::{JobPosting, ListingUrl};

/// Per-batch dispatch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// URLs claimed for this cycle
    pub claimed: usize,
    /// URLs that reached `Success`
    pub succeeded: usize,
    /// URLs that reached `Failed`
    pub failed: usize,
    /// Claimed URLs returned to the retry line without an attempt
    /// (cancellation between batch items)
    pub released: usize,
}

/// Drives claimed URLs through fetch → parse → persist.
pub struct Dispatcher<S> {
    adapter: Arc<dyn PlatformAdapter>,
    storage: Arc<S>,
    ledger: CrawlLedger<S>,
    config: IngestConfig,
}

impl<S: Storage> Dispatcher<S> {
    pub fn new(adapter: Arc<dyn PlatformAdapter>, storage: Arc<S>, config: IngestConfig) -> Self {
        Self {
            adapter,
            ledger: CrawlLedger::new(storage.clone()),
            storage,
            config,
        }
    }

    /// Process one claimed URL to a terminal status.
    ///
    /// Returns the persisted posting on success, `None` on any fetch,
    /// parse or persist failure (the URL is marked `Failed`).
    pub async fn process_url(&self, url: &ListingUrl) -> Option<JobPosting> {
        match self.try_process(url).await {
            Ok(posting) => {
                if let Err(err) = self.ledger.mark_success(&url.source_url).await {
                    error!(url = %url.source_url, error = %err, "Failed to record success");
                }
                Some(posting)
            }
            Err(err) => {
                warn!(url = %url.source_url, error = %err, "Detail dispatch failed");
                if let Err(mark_err) = self.ledger.mark_failure(&url.source_url).await {
                    error!(url = %url.source_url, error = %mark_err, "Failed to record failure");
                }
                None
            }
        }
    }

    async fn try_process(&self, url: &ListingUrl) -> Result<JobPosting> {
        let source_id = self
            .adapter
            .record_id_for(&url.source_url)
            .ok_or_else(|| ParseError::new(&url.source_url, "URL carries no record id"))?;

        let payload = self.adapter.fetch_detail(&url.source_url).await?;
        let mut posting = self.adapter.parse_detail(&payload)?;
        // The URL-derived id is the natural key; the parsed body must not
        // override it.
        posting.source_id = source_id;

        self.storage.upsert_posting(&posting).await?;
        Ok(posting)
    }

    /// Claim a bounded batch and process each URL independently.
    pub async fn run_batch(&self, cancel: &CancellationToken) -> Result<DispatchOutcome> {
        let platform = self.adapter.platform();
        let claimed = self
            .ledger
            .claim_batch(&platform, self.config.dispatch_batch_size)
            .await?;

        let mut outcome = DispatchOutcome {
            claimed: claimed.len(),
            ..DispatchOutcome::default()
        };

        for (index, url) in claimed.iter().enumerate() {
            if cancel.is_cancelled() {
                // Put the unattempted remainder back in the retry line.
                for rest in &claimed[index..] {
                    self.ledger.mark_failure(&rest.source_url).await?;
                    outcome.released += 1;
                }
                break;
            }
            match self.process_url(url).await {
                Some(_) => outcome.succeeded += 1,
                None => outcome.failed += 1,
            }
        }

        info!(
            platform = %platform,
            claimed = outcome.claimed,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            released = outcome.released,
            "Dispatch cycle finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::MockAdapter;
    use crate::types::{CrawlStatus, Platform};

    fn platform() -> Platform {
        Platform::new("boardone")
    }

    async fn seeded_store(urls: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let rows: Vec<ListingUrl> = urls
            .iter()
            .map(|u| ListingUrl::discovered(platform(), *u))
            .collect();
        store.upsert_urls(&rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn successful_dispatch_persists_the_posting() {
        let store = seeded_store(&["http://b1.test/jobs/1"]).await;
        let adapter = MockAdapter::new("boardone").with_detail(
            "http://b1.test/jobs/1",
            "1",
            "Backend Engineer",
        );
        let dispatcher = Dispatcher::new(Arc::new(adapter), store.clone(), IngestConfig::default());

        let outcome = dispatcher.run_batch(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.claimed, 1);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed, 0);

        let url = store.get_url("http://b1.test/jobs/1").await.unwrap().unwrap();
        assert_eq!(url.crawl_status, CrawlStatus::Success);
        assert!(url.details_crawled_at.is_some());

        let posting = store.get_posting(&platform(), "1").await.unwrap().unwrap();
        assert_eq!(posting.title, "Backend Engineer");
        assert_eq!(posting.source_url, "http://b1.test/jobs/1");
    }

    #[tokio::test]
    async fn failures_are_isolated_per_url() {
        let store = seeded_store(&[
            "http://b1.test/jobs/1",
            "http://b1.test/jobs/2",
            "http://b1.test/jobs/3",
        ])
        .await;
        let adapter = MockAdapter::new("boardone")
            .with_detail("http://b1.test/jobs/1", "1", "Backend Engineer")
            .with_detail_fetch_failure("http://b1.test/jobs/2")
            .with_detail("http://b1.test/jobs/3", "3", "Data Engineer");
        let dispatcher = Dispatcher::new(Arc::new(adapter), store.clone(), IngestConfig::default());

        let outcome = dispatcher.run_batch(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        let failed = store.get_url("http://b1.test/jobs/2").await.unwrap().unwrap();
        assert_eq!(failed.crawl_status, CrawlStatus::Failed);
        assert_eq!(store.posting_count(), 2);
    }

    #[tokio::test]
    async fn malformed_detail_marks_the_url_failed() {
        let store = seeded_store(&["http://b1.test/jobs/1"]).await;
        let adapter =
            MockAdapter::new("boardone").with_malformed_detail("http://b1.test/jobs/1");
        let dispatcher = Dispatcher::new(Arc::new(adapter), store.clone(), IngestConfig::default());

        let outcome = dispatcher.run_batch(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(store.posting_count(), 0);
        let url = store.get_url("http://b1.test/jobs/1").await.unwrap().unwrap();
        assert_eq!(url.crawl_status, CrawlStatus::Failed);
    }

    #[tokio::test]
    async fn redelivered_cycles_only_retry_failures() {
        let store = seeded_store(&["http://b1.test/jobs/1", "http://b1.test/jobs/2"]).await;
        let adapter = MockAdapter::new("boardone")
            .with_detail("http://b1.test/jobs/1", "1", "Backend Engineer")
            .with_detail_http_failure("http://b1.test/jobs/2", 404);
        let adapter = Arc::new(adapter);
        let dispatcher = Dispatcher::new(adapter.clone(), store.clone(), IngestConfig::default());
        let cancel = CancellationToken::new();

        let first = dispatcher.run_batch(&cancel).await.unwrap();
        assert_eq!(first.succeeded, 1);
        assert_eq!(first.failed, 1);

        // At-least-once delivery: the same cycle runs again. Only the
        // failed URL is claimable; the success is sticky.
        let second = dispatcher.run_batch(&cancel).await.unwrap();
        assert_eq!(second.claimed, 1);
        assert_eq!(second.failed, 1);
        assert_eq!(store.posting_count(), 1);

        let detail_calls = adapter
            .calls()
            .iter()
            .filter(|c| matches!(c, crate::testing::MockCall::Detail { source_url } if source_url == "http://b1.test/jobs/1"))
            .count();
        assert_eq!(detail_calls, 1, "successful URL must not be re-fetched");
    }

    #[tokio::test]
    async fn cancellation_releases_unattempted_claims() {
        let store = seeded_store(&["http://b1.test/jobs/1", "http://b1.test/jobs/2"]).await;
        let adapter = MockAdapter::new("boardone")
            .with_detail("http://b1.test/jobs/1", "1", "Backend Engineer")
            .with_detail("http://b1.test/jobs/2", "2", "Data Engineer");
        let dispatcher = Dispatcher::new(Arc::new(adapter), store.clone(), IngestConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = dispatcher.run_batch(&cancel).await.unwrap();

        assert_eq!(outcome.claimed, 2);
        assert_eq!(outcome.released, 2);
        assert_eq!(outcome.succeeded, 0);
        // Released URLs are claimable again on the next cycle.
        for url in ["http://b1.test/jobs/1", "http://b1.test/jobs/2"] {
            let stored = store.get_url(url).await.unwrap().unwrap();
            assert!(stored.crawl_status.is_claimable());
        }
    }
}
