//! Crawl-status ledger: the per-URL state machine between discovery
//! and detail dispatch.
//!
//! The only operation needing true mutual exclusion in the whole engine
//! is the claim step — `{Pending, Failed} → Queued` must be one atomic
//! conditional update so two dispatch cycles never race on a URL. The
//! storage backends provide that; this wrapper provides the typed
//! transitions around it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::Storage;
use crate::types::{CrawlStatus, ListingUrl, Platform};

/// Typed access to the crawl-status state machine.
///
/// Status only advances along
/// `Pending/Failed → Queued → Success | Failed`; `Failed` cycles back
/// through `Queued` on retry and `Success` is sticky.
pub struct CrawlLedger<S> {
    storage: Arc<S>,
}

impl<S: Storage> CrawlLedger<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Claim up to `limit` claimable URLs for a platform, flipping them
    /// to `Queued` before any network call happens.
    pub async fn claim_batch(&self, platform: &Platform, limit: u32) -> Result<Vec<ListingUrl>> {
        let claimed = self.storage.claim_for_dispatch(platform, limit).await?;
        debug!(platform = %platform, claimed = claimed.len(), "Claimed URLs for dispatch");
        Ok(claimed)
    }

    /// Record a successful fetch+parse+persist for a URL.
    pub async fn mark_success(&self, source_url: &str) -> Result<bool> {
        self.mark(source_url, CrawlStatus::Success).await
    }

    /// Record a failed attempt; the URL becomes claimable again.
    pub async fn mark_failure(&self, source_url: &str) -> Result<bool> {
        self.mark(source_url, CrawlStatus::Failed).await
    }

    async fn mark(&self, source_url: &str, status: CrawlStatus) -> Result<bool> {
        let changed = self.storage.mark_crawl_status(source_url, status).await?;
        if !changed {
            // Either the row is gone or it already reached Success.
            warn!(url = %source_url, status = %status, "Status write was a no-op");
        }
        Ok(changed)
    }
}
