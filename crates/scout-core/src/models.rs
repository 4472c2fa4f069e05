use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::site::Site;

/// Hard ceiling on `max_results` for any query.
pub const MAX_RESULTS_CAP: usize = 100;

/// Default `max_results` when a request leaves it out.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// What kind of record a query is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Vehicle,
    Event,
    Article,
    #[default]
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Vehicle => "vehicle",
            QueryType::Event => "event",
            QueryType::Article => "article",
            QueryType::General => "general",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of scraping strategies, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Plain HTTP fetch of a listing site's search page.
    Http,
    /// Firecrawl search API.
    Firecrawl,
    /// Brave web search API.
    Brave,
    /// Apify Google Search scraper actor.
    Apify,
    /// Jina search API.
    Jina,
    /// Headless Chromium rendering of a listing site's search page.
    Browser,
}

impl ToolKind {
    /// Default fallback order: cheap HTTP scraping, then remote search APIs,
    /// then full browser automation.
    pub const DEFAULT_ORDER: [ToolKind; 6] = [
        ToolKind::Http,
        ToolKind::Firecrawl,
        ToolKind::Brave,
        ToolKind::Apify,
        ToolKind::Jina,
        ToolKind::Browser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Http => "http",
            ToolKind::Firecrawl => "firecrawl",
            ToolKind::Brave => "brave",
            ToolKind::Apify => "apify",
            ToolKind::Jina => "jina",
            ToolKind::Browser => "browser",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(ToolKind::Http),
            "firecrawl" => Ok(ToolKind::Firecrawl),
            "brave" => Ok(ToolKind::Brave),
            "apify" => Ok(ToolKind::Apify),
            "jina" => Ok(ToolKind::Jina),
            "browser" | "playwright" => Ok(ToolKind::Browser),
            _ => Err(format!("Unknown tool: {s}")),
        }
    }
}

/// A single scrape request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeQuery {
    pub query: String,
    #[serde(rename = "type", default)]
    pub query_type: QueryType,
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, serde_json::Value>>,
    /// Explicit target sites. When absent, sites are derived from the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<Site>>,
}

impl ScrapeQuery {
    pub fn new(query: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            query: query.into(),
            query_type,
            max_results: DEFAULT_MAX_RESULTS,
            filters: None,
            sites: None,
        }
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn with_sites(mut self, sites: Vec<Site>) -> Self {
        self.sites = Some(sites);
        self
    }

    pub fn with_filters(mut self, filters: BTreeMap<String, serde_json::Value>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Reject malformed queries before any fetch happens.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.query.trim().is_empty() {
            return Err(AppError::ValidationError("query must not be empty".into()));
        }
        validate_max_results(self.max_results)?;
        if let Some(sites) = &self.sites {
            if sites.is_empty() {
                return Err(AppError::ValidationError(
                    "sites must not be empty when given".into(),
                ));
            }
        }
        Ok(())
    }

    /// Sites this query targets: the explicit list, or listing sites for
    /// vehicles and the open web for everything else.
    pub fn target_sites(&self) -> Vec<Site> {
        match &self.sites {
            Some(sites) if !sites.is_empty() => sites.clone(),
            _ if self.query_type == QueryType::Vehicle => Site::LISTING.to_vec(),
            _ => vec![Site::Web],
        }
    }
}

/// `max_results` must be a positive integer not exceeding [`MAX_RESULTS_CAP`].
pub fn validate_max_results(max_results: usize) -> Result<(), AppError> {
    if max_results == 0 || max_results > MAX_RESULTS_CAP {
        return Err(AppError::ValidationError(format!(
            "maxResults must be between 1 and {MAX_RESULTS_CAP}, got {max_results}"
        )));
    }
    Ok(())
}

/// A record extracted from a listing page or a search API.
///
/// One shape for every record type; which optional fields are populated depends
/// on `record_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedRecord {
    #[serde(rename = "type")]
    pub record_type: QueryType,
    pub title: String,
    /// Site or tool the record came from (e.g. "ClassicCars.com", "brave").
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ScrapedRecord {
    pub fn new(record_type: QueryType, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            record_type,
            title: title.into(),
            source: source.into(),
            scraped_at: Utc::now(),
            url: None,
            stock_number: None,
            year: None,
            make: None,
            model: None,
            price: None,
            price_text: None,
            location: None,
            date: None,
            venue: None,
            author: None,
            published_date: None,
            description: None,
            content: None,
            images: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_stock_number(mut self, stock_number: impl Into<String>) -> Self {
        self.stock_number = Some(stock_number.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One tool/site fetch attempt, as reported in [`ScrapeMetadata::attempts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAttempt {
    pub tool: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,
    pub success: bool,
    pub records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Timing and diagnostics attached to every [`ScrapeResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeMetadata {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub sites: Vec<Site>,
    /// Number of records in `data`.
    pub results_count: usize,
    /// Number of records the winning tool returned before capping.
    pub total_found: usize,
    pub execution_time_ms: u64,
    pub attempts: Vec<ToolAttempt>,
}

impl ScrapeMetadata {
    pub fn new(query: &ScrapeQuery) -> Self {
        Self {
            query: query.query.clone(),
            timestamp: Utc::now(),
            sites: query.target_sites(),
            results_count: 0,
            total_found: 0,
            execution_time_ms: 0,
            attempts: Vec::new(),
        }
    }
}

/// Outcome of a fetch attempt or of the whole fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub success: bool,
    pub tool: Option<ToolKind>,
    pub data: Vec<ScrapedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: ScrapeMetadata,
}

impl ScrapeResult {
    pub fn succeeded(tool: ToolKind, data: Vec<ScrapedRecord>, mut metadata: ScrapeMetadata) -> Self {
        metadata.results_count = data.len();
        metadata.total_found = metadata.total_found.max(data.len());
        Self {
            success: true,
            tool: Some(tool),
            data,
            error: None,
            metadata,
        }
    }

    pub fn failed(tool: Option<ToolKind>, error: impl Into<String>, metadata: ScrapeMetadata) -> Self {
        Self {
            success: false,
            tool,
            data: Vec::new(),
            error: Some(error.into()),
            metadata,
        }
    }

    /// Truncate `data` to at most `max` records, keeping `total_found`.
    pub fn capped(mut self, max: usize) -> Self {
        self.metadata.total_found = self.metadata.total_found.max(self.data.len());
        self.data.truncate(max);
        self.metadata.results_count = self.data.len();
        self
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
