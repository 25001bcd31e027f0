//! Testing utilities including a scripted platform adapter.
//!
//! Useful for exercising the engine without network access: listings,
//! category trees and detail payloads are all predefined, and every
//! adapter call is recorded for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{FetchError, FetchResult, ParseError};
use crate::traits::PlatformAdapter;
use crate::types::{
    JobPosting, ListingPage, Platform, RawPayload, RemoteCategory,
};

/// Record of a call made to the mock adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CategoryTree,
    ListingPage { category_id: String, page: u32 },
    Detail { source_url: String },
}

enum DetailScript {
    Payload(RawPayload),
    FetchTransient,
    FetchHttp(u16),
}

#[derive(Default)]
struct ListingScript {
    pages: Vec<ListingPage>,
    failures: Vec<usize>,
    repeat_last: bool,
}

/// Shape the mock's detail bodies deserialize into.
#[derive(Deserialize)]
struct MockDetail {
    id: String,
    title: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// A scripted [`PlatformAdapter`] for tests.
pub struct MockAdapter {
    platform: Platform,
    first_page: u32,
    tree: Vec<RemoteCategory>,
    fail_tree: bool,
    listings: HashMap<String, ListingScript>,
    details: HashMap<String, DetailScript>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: Platform::new(platform.into()),
            first_page: 1,
            tree: Vec::new(),
            fail_tree: false,
            listings: HashMap::new(),
            details: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_first_page(mut self, first_page: u32) -> Self {
        self.first_page = first_page;
        self
    }

    /// Predefine the remote category tree.
    pub fn with_category_tree(mut self, tree: Vec<RemoteCategory>) -> Self {
        self.tree = tree;
        self
    }

    /// Make `fetch_category_tree` fail with a transient error.
    pub fn with_tree_failure(mut self) -> Self {
        self.fail_tree = true;
        self
    }

    /// Predefine a category's listing pages, in page order.
    pub fn with_listing(mut self, category_id: impl Into<String>, pages: Vec<ListingPage>) -> Self {
        self.listings.entry(category_id.into()).or_default().pages = pages;
        self
    }

    /// Serve the final scripted page again for any page past the script,
    /// instead of an empty page — a source that never signals emptiness.
    pub fn with_repeating_last_page(mut self, category_id: impl Into<String>) -> Self {
        self.listings
            .entry(category_id.into())
            .or_default()
            .repeat_last = true;
        self
    }

    /// Fail the fetch of the page at `page_index` (0-based into the script).
    pub fn with_listing_failure(
        mut self,
        category_id: impl Into<String>,
        page_index: usize,
    ) -> Self {
        self.listings
            .entry(category_id.into())
            .or_default()
            .failures
            .push(page_index);
        self
    }

    /// Predefine a well-formed JSON detail body for a URL.
    pub fn with_detail(
        mut self,
        source_url: impl Into<String>,
        id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let source_url = source_url.into();
        let body = serde_json::json!({ "id": id.into(), "title": title.into() }).to_string();
        let payload = RawPayload::new(source_url.clone(), body).with_content_type("application/json");
        self.details
            .insert(source_url, DetailScript::Payload(payload));
        self
    }

    /// Predefine a raw detail payload verbatim.
    pub fn with_detail_payload(mut self, source_url: impl Into<String>, payload: RawPayload) -> Self {
        self.details
            .insert(source_url.into(), DetailScript::Payload(payload));
        self
    }

    /// Make `fetch_detail` fail transiently for a URL.
    pub fn with_detail_fetch_failure(mut self, source_url: impl Into<String>) -> Self {
        self.details
            .insert(source_url.into(), DetailScript::FetchTransient);
        self
    }

    /// Make `fetch_detail` fail with a permanent HTTP status for a URL.
    pub fn with_detail_http_failure(mut self, source_url: impl Into<String>, status: u16) -> Self {
        self.details
            .insert(source_url.into(), DetailScript::FetchHttp(status));
        self
    }

    /// Serve a detail body that will not parse.
    pub fn with_malformed_detail(mut self, source_url: impl Into<String>) -> Self {
        let source_url = source_url.into();
        let payload = RawPayload::new(source_url.clone(), "<html>not the api</html>");
        self.details
            .insert(source_url, DetailScript::Payload(payload));
        self
    }

    /// Every call the adapter has served, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn first_page(&self) -> u32 {
        self.first_page
    }

    async fn fetch_category_tree(&self) -> FetchResult<Vec<RemoteCategory>> {
        self.record(MockCall::CategoryTree);
        if self.fail_tree {
            return Err(FetchError::Transient(Box::new(std::io::Error::other(
                "scripted tree failure",
            ))));
        }
        Ok(self.tree.clone())
    }

    async fn fetch_listing_page(&self, category_id: &str, page: u32) -> FetchResult<ListingPage> {
        self.record(MockCall::ListingPage {
            category_id: category_id.to_string(),
            page,
        });
        let Some(script) = self.listings.get(category_id) else {
            return Ok(ListingPage::default());
        };
        let index = page.saturating_sub(self.first_page) as usize;
        if script.failures.contains(&index) {
            return Err(FetchError::Transient(Box::new(std::io::Error::other(
                "scripted page failure",
            ))));
        }
        if let Some(listing) = script.pages.get(index) {
            return Ok(listing.clone());
        }
        if script.repeat_last {
            if let Some(last) = script.pages.last() {
                return Ok(last.clone());
            }
        }
        Ok(ListingPage::default())
    }

    async fn fetch_detail(&self, source_url: &str) -> FetchResult<RawPayload> {
        self.record(MockCall::Detail {
            source_url: source_url.to_string(),
        });
        match self.details.get(source_url) {
            Some(DetailScript::Payload(payload)) => Ok(payload.clone()),
            Some(DetailScript::FetchTransient) => Err(FetchError::Transient(Box::new(
                std::io::Error::other("scripted detail failure"),
            ))),
            Some(DetailScript::FetchHttp(status)) => Err(FetchError::Http {
                url: source_url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Http {
                url: source_url.to_string(),
                status: 404,
            }),
        }
    }

    fn parse_detail(&self, payload: &RawPayload) -> Result<JobPosting, ParseError> {
        let detail: MockDetail = serde_json::from_str(&payload.body)
            .map_err(|e| ParseError::new(&payload.url, e.to_string()))?;
        let mut posting = JobPosting::new(
            self.platform.clone(),
            detail.id,
            &payload.url,
            detail.title,
        );
        posting.company = detail.company;
        posting.location = detail.location;
        Ok(posting)
    }

    fn record_id_for(&self, source_url: &str) -> Option<String> {
        source_url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.to_string())
    }
}
