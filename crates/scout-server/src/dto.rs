use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scout_core::error::AppError;
use scout_core::job::{Job, JobKind, QueryOutcome, SkippedRecord};
use scout_core::models::{
    DEFAULT_MAX_RESULTS, QueryType, ScrapeMetadata, ScrapeQuery, ScrapeResult, ScrapedRecord,
    ToolKind,
};
use scout_core::orchestrator::{OrchestratorStats, QuickScrapeSummary};
use scout_core::site::Site;

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    /// Search text, e.g. "1967 Ford Mustang"
    pub query: String,
    /// One of vehicle, event, article, general (default: general)
    #[serde(rename = "type", default)]
    #[schema(value_type = String, example = "vehicle")]
    pub query_type: QueryType,
    /// Maximum records to return, 1 to 100 (default: 10)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub filters: Option<BTreeMap<String, serde_json::Value>>,
    /// Site names; "all" expands to every listing site
    #[serde(default)]
    pub sites: Option<Vec<String>>,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl ScrapeRequest {
    /// Turn the request into a validated query.
    pub fn into_query(self) -> Result<ScrapeQuery, AppError> {
        let mut query = ScrapeQuery::new(self.query.trim(), self.query_type)
            .with_max_results(self.max_results);
        if let Some(filters) = self.filters {
            query = query.with_filters(filters);
        }
        if let Some(sites) = self.sites {
            query = query.with_sites(Site::parse_list(&sites)?);
        }
        query.validate()?;
        Ok(query)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,
    #[schema(value_type = Option<String>)]
    pub tool: Option<ToolKind>,
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<ScrapedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: ScrapeMetadata,
}

impl From<ScrapeResult> for ScrapeResponse {
    fn from(result: ScrapeResult) -> Self {
        Self {
            success: result.success,
            tool: result.tool,
            data: result.data,
            error: result.error,
            metadata: result.metadata,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BatchRequest {
    /// 1 to 100 queries
    pub queries: Vec<ScrapeRequest>,
}

impl BatchRequest {
    pub fn into_queries(self) -> Result<Vec<ScrapeQuery>, AppError> {
        self.queries
            .into_iter()
            .enumerate()
            .map(|(i, request)| {
                request.into_query().map_err(|e| match e {
                    AppError::ValidationError(msg) => {
                        AppError::ValidationError(format!("queries[{i}]: {msg}"))
                    }
                    other => other,
                })
            })
            .collect()
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub kind: String,
    pub status: String,
    /// Shared query text of a listing job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub query_count: usize,
    pub sites: Vec<String>,
    pub tools_used: Vec<String>,
    pub total_found: usize,
    pub total_saved: usize,
    pub duplicates: usize,
    #[schema(value_type = Vec<Object>)]
    pub skipped: Vec<SkippedRecord>,
    pub errors: Vec<String>,
    #[schema(value_type = Vec<Object>)]
    pub outcomes: Vec<QueryOutcome>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds from start to end; null while the job runs
    pub duration: Option<i64>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let query = match job.queries.split_first() {
            Some((first, rest)) if rest.iter().all(|q| q.query == first.query) => {
                Some(first.query.clone())
            }
            _ => None,
        };
        Self {
            duration: job.duration_ms(),
            id: job.id,
            kind: match job.kind {
                JobKind::Batch => "batch".to_string(),
                JobKind::Listing => "listing".to_string(),
            },
            status: job.status.to_string(),
            query,
            query_count: job.queries.len(),
            sites: job.sites.iter().map(|s| s.as_str().to_string()).collect(),
            tools_used: job.tools_used.iter().map(|t| t.as_str().to_string()).collect(),
            total_found: job.total_found,
            total_saved: job.total_saved,
            duplicates: job.duplicates,
            skipped: job.skipped,
            errors: job.errors,
            outcomes: job.outcomes,
            start_time: job.start_time,
            end_time: job.end_time,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BatchResponse {
    pub success: bool,
    pub result: JobResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub success: bool,
    pub jobs: Vec<JobResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobStatusResponse {
    pub success: bool,
    pub job: JobResponse,
}

// ---------------------------------------------------------------------------
// Listing jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListingScrapeRequest {
    pub query: String,
    /// Listing sites to search (default: ["all"])
    #[serde(default = "default_sites")]
    pub sites: Vec<String>,
    /// Listings per site, 1 to 100 (default: 20)
    #[serde(default = "default_max_listings")]
    pub max_listings: usize,
}

fn default_sites() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_max_listings() -> usize {
    20
}

impl ListingScrapeRequest {
    pub fn target_sites(&self) -> Result<Vec<Site>, AppError> {
        Site::parse_list(&self.sites)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartJobResponse {
    pub success: bool,
    pub job_id: String,
    pub status: String,
    pub message: String,
}

impl From<Job> for StartJobResponse {
    fn from(job: Job) -> Self {
        Self {
            success: true,
            job_id: job.id,
            status: job.status.to_string(),
            message: "Scraping job started. Use /status/{jobId} to check progress.".to_string(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuickScrapeResponse {
    pub success: bool,
    pub job_id: String,
    pub query: String,
    pub sites: Vec<String>,
    pub found: usize,
    pub saved: usize,
    pub errors: Vec<String>,
}

impl QuickScrapeResponse {
    pub fn new(query: String, sites: &[Site], summary: QuickScrapeSummary) -> Self {
        Self {
            success: true,
            job_id: summary.job_id,
            query,
            sites: sites.iter().map(|s| s.as_str().to_string()).collect(),
            found: summary.found,
            saved: summary.saved,
            errors: summary.errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Stats & cache
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub stats: OrchestratorStats,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
    /// Fingerprints dropped from the cache
    pub cleared: usize,
}

// ---------------------------------------------------------------------------
// Health & errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
