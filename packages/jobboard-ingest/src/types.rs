//! Domain types for the ingestion engine.
//!
//! Entities carry their natural-key and update-column sets as typed
//! constants so storage backends never introspect columns at runtime.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for a job-board platform (e.g. "boardone", "boardtwo").
///
/// Kept open rather than a closed enum: platforms are registered by
/// supplying a `PlatformAdapter`, not by editing this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform(String);

impl Platform {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Per-URL detail-crawl lifecycle state.
///
/// Transitions only advance along
/// `Pending/Failed → Queued → (Processing →) Success | Failed`;
/// `Success` is sticky and never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Newly discovered, never dispatched
    #[default]
    Pending,
    /// Claimed by a dispatch cycle, not yet resolved
    Queued,
    /// Detail fetch in flight (optional intermediate state)
    Processing,
    /// Detail fetched, parsed and persisted
    Success,
    /// Fetch, parse or persist failed; eligible for re-claim
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Pending => "pending",
            CrawlStatus::Queued => "queued",
            CrawlStatus::Processing => "processing",
            CrawlStatus::Success => "success",
            CrawlStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CrawlStatus::Pending),
            "queued" => Some(CrawlStatus::Queued),
            "processing" => Some(CrawlStatus::Processing),
            "success" => Some(CrawlStatus::Success),
            "failed" => Some(CrawlStatus::Failed),
            _ => None,
        }
    }

    /// Whether a dispatch cycle may claim a URL in this state.
    pub fn is_claimable(&self) -> bool {
        matches!(self, CrawlStatus::Pending | CrawlStatus::Failed)
    }

    /// Whether this state never advances again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlStatus::Success)
    }

    /// Validate a single transition against the ledger's state machine.
    pub fn can_transition_to(&self, next: CrawlStatus) -> bool {
        use CrawlStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Failed, Queued)
                | (Queued, Processing)
                | (Queued, Success)
                | (Queued, Failed)
                | (Processing, Success)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listing liveness, distinct from the detail-crawl lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ListingStatus::Active),
            "inactive" => Some(ListingStatus::Inactive),
            _ => None,
        }
    }
}

/// One node of a platform's category taxonomy, as stored.
///
/// Created and updated only by the category synchronizer. Nodes with
/// `parent_id = None` are roots; the tree is acyclic by construction
/// (children are flattened from a finite remote tree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub platform: Platform,
    pub category_id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl Category {
    pub const TABLE: &'static str = "categories";
    pub const CONFLICT_COLUMNS: &'static [&'static str] = &["platform", "category_id"];
    pub const UPDATE_COLUMNS: &'static [&'static str] = &["name", "parent_id"];
}

/// One node of a platform's category taxonomy, as fetched.
///
/// Hierarchical: the synchronizer flattens it depth-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<RemoteCategory>,
}

impl RemoteCategory {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: RemoteCategory) -> Self {
        self.children.push(child);
        self
    }
}

/// A discovered detail-page URL and its crawl lifecycle columns.
///
/// Inserted once per discovery and never deleted. Re-discovery may refresh
/// listing liveness but must never touch `crawl_status` — the update-column
/// set excludes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingUrl {
    pub source_url: String,
    pub platform: Platform,
    pub status: ListingStatus,
    pub crawl_status: CrawlStatus,
    pub crawled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub details_crawled_at: Option<DateTime<Utc>>,
}

impl ListingUrl {
    pub const TABLE: &'static str = "urls";
    pub const CONFLICT_COLUMNS: &'static [&'static str] = &["source_url"];
    pub const UPDATE_COLUMNS: &'static [&'static str] = &["status", "updated_at"];

    /// A freshly discovered URL: active, pending, timestamped now.
    pub fn discovered(platform: Platform, source_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            source_url: source_url.into(),
            platform,
            status: ListingStatus::Active,
            crawl_status: CrawlStatus::Pending,
            crawled_at: now,
            updated_at: now,
            details_crawled_at: None,
        }
    }
}

/// Join row associating a URL with one category it was discovered under.
///
/// Pure association: the update-column set is empty, so a key collision
/// is a silent no-op rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCategory {
    pub source_url: String,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
}

impl UrlCategory {
    pub const TABLE: &'static str = "url_categories";
    pub const CONFLICT_COLUMNS: &'static [&'static str] = &["source_url", "category_id"];
    pub const UPDATE_COLUMNS: &'static [&'static str] = &[];

    pub fn new(source_url: impl Into<String>, category_id: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            category_id: category_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// A normalized job posting, keyed by `(platform, source_id)`.
///
/// Field values are supplied by the platform's `parse_detail` collaborator;
/// this engine only persists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub platform: Platform,
    pub source_id: String,
    pub source_url: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub salary: Option<String>,
    pub description: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobPosting {
    pub const TABLE: &'static str = "postings";
    pub const CONFLICT_COLUMNS: &'static [&'static str] = &["platform", "source_id"];
    pub const UPDATE_COLUMNS: &'static [&'static str] = &[
        "source_url",
        "title",
        "company",
        "location",
        "employment_type",
        "salary",
        "description",
        "posted_at",
        "updated_at",
    ];

    pub fn new(
        platform: Platform,
        source_id: impl Into<String>,
        source_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            source_id: source_id.into(),
            source_url: source_url.into(),
            title: title.into(),
            company: None,
            location: None,
            employment_type: None,
            salary: None,
            description: None,
            posted_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_salary(mut self, salary: impl Into<String>) -> Self {
        self.salary = Some(salary.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Raw detail-page content before parsing.
///
/// This is the output of `fetch_detail` — body bytes as text plus
/// whatever transport metadata the platform adapter captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPayload {
    /// URL or identifier this content was fetched from
    pub url: String,

    /// Raw content (JSON or HTML, per platform)
    pub body: String,

    /// MIME type if the transport reported one
    pub content_type: Option<String>,

    /// When the content was fetched
    pub fetched_at: DateTime<Utc>,

    /// Transport metadata (e.g. HTTP headers)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RawPayload {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            content_type: None,
            fetched_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One page of a category listing, as returned by a platform adapter.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Detail-page URLs extracted from the listing, in page order
    pub urls: Vec<String>,

    /// Highest page number the platform reports for this listing, if any
    pub max_page: Option<u32>,
}

impl ListingPage {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            max_page: None,
        }
    }

    pub fn with_max_page(mut self, max_page: u32) -> Self {
        self.max_page = Some(max_page);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
