//! Remote search API tools: Firecrawl, Brave Search, Apify and Jina.
//!
//! All of them answer a text query with a list of web results. Results become
//! records of the query's type; listing sites are reached with a
//! `site:<host>` prefix on the query.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use scout_core::error::AppError;
use scout_core::models::{QueryType, ScrapeQuery, ScrapedRecord, ToolKind};
use scout_core::site::Site;
use scout_core::traits::SiteFetcher;
use url::Url;

use crate::fetcher::{check_status, map_send_error};

/// Brave caps `count` at 20.
const BRAVE_MAX_COUNT: usize = 20;
/// Google result pages hold at most 100 hits.
const APIFY_MAX_PER_PAGE: usize = 100;
const APIFY_ACTOR: &str = "apify~google-search-scraper";
const DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchApi {
    Firecrawl,
    Brave,
    Apify,
    Jina,
}

impl SearchApi {
    pub fn tool(&self) -> ToolKind {
        match self {
            SearchApi::Firecrawl => ToolKind::Firecrawl,
            SearchApi::Brave => ToolKind::Brave,
            SearchApi::Apify => ToolKind::Apify,
            SearchApi::Jina => ToolKind::Jina,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            SearchApi::Firecrawl => "https://api.firecrawl.dev",
            SearchApi::Brave => "https://api.search.brave.com",
            SearchApi::Apify => "https://api.apify.com",
            SearchApi::Jina => "https://s.jina.ai",
        }
    }
}

// ---- Provider response types ----

#[derive(Debug, Deserialize)]
struct FirecrawlResponse {
    #[serde(default)]
    data: Vec<FirecrawlItem>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    page_age: Option<String>,
}

/// One dataset item of the Google Search actor: a result page with its
/// organic hits, or a single hit when the actor flattens its output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApifyItem {
    #[serde(default)]
    organic_results: Option<Vec<ApifyHit>>,
    #[serde(flatten)]
    hit: ApifyHit,
}

#[derive(Debug, Deserialize)]
struct ApifyHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JinaResponse {
    #[serde(default)]
    data: Vec<JinaItem>,
}

#[derive(Debug, Deserialize)]
struct JinaItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Common shape of one search hit before it becomes a record.
struct Hit {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    content: Option<String>,
    published: Option<String>,
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn parse_hits(api: SearchApi, body: &str) -> Result<Vec<Hit>, AppError> {
    let hits = match api {
        SearchApi::Firecrawl => serde_json::from_str::<FirecrawlResponse>(body)?
            .data
            .into_iter()
            .map(|item| Hit {
                description: item
                    .description
                    .or_else(|| item.markdown.as_deref().map(|m| truncate_chars(m, DESCRIPTION_CHARS))),
                content: item.markdown,
                title: item.title,
                url: item.url,
                published: None,
            })
            .collect(),
        SearchApi::Brave => serde_json::from_str::<BraveResponse>(body)?
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|item| Hit {
                content: item.description.clone(),
                description: item.description,
                title: item.title,
                url: item.url,
                published: item.page_age,
            })
            .collect(),
        SearchApi::Apify => serde_json::from_str::<Vec<ApifyItem>>(body)?
            .into_iter()
            .flat_map(|item| match item.organic_results {
                Some(results) => results,
                None => vec![item.hit],
            })
            .map(|item| Hit {
                content: item.description.clone(),
                description: item.description,
                title: item.title,
                url: item.url,
                published: item.date,
            })
            .collect(),
        SearchApi::Jina => serde_json::from_str::<JinaResponse>(body)?
            .data
            .into_iter()
            .map(|item| Hit {
                title: item.title,
                url: item.url,
                description: item.description,
                content: item.content,
                published: None,
            })
            .collect(),
    };
    Ok(hits)
}

/// Convert a provider response body into records of `record_type`.
/// Hits without a title are dropped.
pub fn parse_results(
    api: SearchApi,
    body: &str,
    record_type: QueryType,
    source: &str,
) -> Result<Vec<ScrapedRecord>, AppError> {
    let records = parse_hits(api, body)
        .map_err(|e| AppError::ParseError(format!("{} response: {e}", api.tool())))?
        .into_iter()
        .filter_map(|hit| {
            let title = hit.title.filter(|t| !t.trim().is_empty())?;
            let mut record = ScrapedRecord::new(record_type, title, source);
            record.url = hit.url.filter(|u| !u.is_empty());
            record.description = hit.description.filter(|d| !d.is_empty());
            record.content = hit.content.filter(|c| !c.is_empty());
            if record_type == QueryType::Article {
                record.published_date = hit.published;
            }
            Some(record)
        })
        .collect();
    Ok(records)
}

/// Query text sent to the provider: listing sites are pinned with `site:`.
pub fn search_terms(site: Site, query: &str) -> String {
    match site.host() {
        Some(host) => format!("site:{} {}", host.trim_start_matches("www."), query.trim()),
        None => query.trim().to_string(),
    }
}

/// One search API as a scraping strategy.
#[derive(Clone)]
pub struct SearchTool {
    api: SearchApi,
    api_key: Option<String>,
    base_url: String,
    client: Client,
    timeout_secs: u64,
}

impl SearchTool {
    pub fn new(api: SearchApi, api_key: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self {
            api,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: api.default_base_url().to_string(),
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Point the tool at another endpoint (self-hosted Firecrawl, test server).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn api(&self) -> SearchApi {
        self.api
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url, AppError> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map_err(|e| AppError::ConfigError(format!("Invalid {} base URL: {e}", self.api.tool())))
    }

    async fn request(&self, api_key: &str, terms: &str, limit: usize) -> Result<String, AppError> {
        let request = match self.api {
            SearchApi::Firecrawl => {
                let url = self.endpoint("/v1/search", &[])?;
                self.client
                    .post(url)
                    .bearer_auth(api_key)
                    .json(&serde_json::json!({
                        "query": terms,
                        "limit": limit,
                        "scrapeOptions": { "formats": ["markdown"], "onlyMainContent": true },
                    }))
            }
            SearchApi::Brave => {
                let url = self.endpoint(
                    "/res/v1/web/search",
                    &[("q", terms.to_string()), ("count", limit.min(BRAVE_MAX_COUNT).to_string())],
                )?;
                self.client
                    .get(url)
                    .header("X-Subscription-Token", api_key)
                    .header(ACCEPT, "application/json")
            }
            SearchApi::Apify => {
                let url = self.endpoint(
                    &format!("/v2/acts/{APIFY_ACTOR}/run-sync-get-dataset-items"),
                    &[("format", "json".to_string())],
                )?;
                self.client
                    .post(url)
                    .bearer_auth(api_key)
                    .json(&serde_json::json!({
                        "queries": terms,
                        "maxPagesPerQuery": 1,
                        "resultsPerPage": limit.min(APIFY_MAX_PER_PAGE),
                        "languageCode": "en",
                        "mobileResults": false,
                    }))
            }
            SearchApi::Jina => {
                let url = self.endpoint("/", &[("q", terms.to_string())])?;
                self.client
                    .get(url)
                    .header(AUTHORIZATION, format!("Bearer {api_key}"))
                    .header(ACCEPT, "application/json")
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;
        let status = response.status();
        let url = response.url().to_string();
        check_status(status, &url)?;
        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

impl SiteFetcher for SearchTool {
    fn tool(&self) -> ToolKind {
        self.api.tool()
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn supports(&self, _site: Site) -> bool {
        true
    }

    fn request_host(&self, _site: Site) -> String {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.base_url.clone())
    }

    async fn fetch(
        &self,
        site: Site,
        query: &ScrapeQuery,
        max_results: usize,
    ) -> Result<Vec<ScrapedRecord>, AppError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::ConfigError(format!("{} API key not configured", self.api.tool()))
        })?;
        let terms = search_terms(site, &query.query);
        tracing::debug!(tool = %self.api.tool(), %site, %terms, "Querying search API");

        let body = self.request(api_key, &terms, max_results).await?;
        let source = if site.is_listing() {
            site.display_name()
        } else {
            self.api.tool().as_str()
        };
        parse_results(self.api, &body, query.query_type, source)
    }
}
