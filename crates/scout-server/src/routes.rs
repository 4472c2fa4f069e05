use std::sync::Arc;

use axum::{Json, Router};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use scout_core::job::JobKind;
use scout_core::traits::{RecordStore, SiteFetcher};

use crate::dto::{
    BatchRequest, BatchResponse, ClearCacheResponse, HealthResponse, JobListResponse,
    JobResponse, JobStatusResponse, ListingScrapeRequest, QuickScrapeResponse, ScrapeRequest,
    ScrapeResponse, StartJobResponse, StatsResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes.
pub fn router<S, R>(state: Arc<AppState<S, R>>) -> Router
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let scraper = Router::new()
        .route("/scrape", post(scrape::<S, R>))
        .route("/batch", post(batch::<S, R>))
        .route("/stats", get(stats::<S, R>))
        .route("/jobs", get(list_batch_jobs::<S, R>))
        .route("/jobs/{job_id}", get(get_batch_job::<S, R>))
        .route("/clear-cache", post(clear_cache::<S, R>));

    let listings = Router::new()
        .route("/scrape", post(start_listing_job::<S, R>))
        .route("/status/{job_id}", get(listing_job_status::<S, R>))
        .route("/jobs", get(list_listing_jobs::<S, R>))
        .route("/quick-scrape", post(quick_scrape::<S, R>));

    let public = Router::new()
        .route("/health", get(health::<S, R>))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public
        .nest("/api/scraper", scraper)
        .nest("/api/playwright-scraper", listings)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Multi-tool scraper
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/scraper/scrape",
    request_body = ScrapeRequest,
    responses(
        (status = 200, description = "Records from the first tool that succeeded", body = ScrapeResponse),
        (status = 400, description = "Bad request", body = crate::dto::ErrorResponse),
        (status = 500, description = "Every tool failed", body = ScrapeResponse),
    ),
    tag = "scraper"
)]
pub async fn scrape<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let Json(body) = payload?;
    let query = body.into_query()?;
    tracing::info!(query = %query.query, query_type = %query.query_type, "Scrape request");

    let result = state.orchestrator.scrape(&query).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((status, Json(ScrapeResponse::from(result))))
}

#[utoipa::path(
    post,
    path = "/api/scraper/batch",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Finished batch job", body = BatchResponse),
        (status = 400, description = "Bad request", body = crate::dto::ErrorResponse),
    ),
    tag = "scraper"
)]
pub async fn batch<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let Json(body) = payload?;
    let queries = body.into_queries()?;
    tracing::info!(queries = queries.len(), "Batch scrape request");

    let job = state.orchestrator.run_batch_job(queries).await?;

    Ok(Json(BatchResponse {
        success: true,
        result: JobResponse::from(job),
    }))
}

#[utoipa::path(
    get,
    path = "/api/scraper/stats",
    responses(
        (status = 200, description = "Per-tool counters and cache size", body = StatsResponse),
    ),
    tag = "scraper"
)]
pub async fn stats<S, R>(State(state): State<Arc<AppState<S, R>>>) -> impl IntoResponse
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    Json(StatsResponse {
        success: true,
        stats: state.orchestrator.stats(),
    })
}

#[utoipa::path(
    get,
    path = "/api/scraper/jobs",
    responses(
        (status = 200, description = "Batch jobs", body = JobListResponse),
    ),
    tag = "scraper"
)]
pub async fn list_batch_jobs<S, R>(State(state): State<Arc<AppState<S, R>>>) -> impl IntoResponse
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    job_list(&state, JobKind::Batch)
}

#[utoipa::path(
    get,
    path = "/api/scraper/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job details", body = JobStatusResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
    ),
    tag = "scraper"
)]
pub async fn get_batch_job<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    job_status(&state, &job_id)
}

#[utoipa::path(
    post,
    path = "/api/scraper/clear-cache",
    responses(
        (status = 200, description = "Deduplication cache cleared", body = ClearCacheResponse),
    ),
    tag = "scraper"
)]
pub async fn clear_cache<S, R>(State(state): State<Arc<AppState<S, R>>>) -> impl IntoResponse
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let cleared = state.orchestrator.clear_cache();
    tracing::info!(cleared, "Deduplication cache cleared");

    Json(ClearCacheResponse {
        success: true,
        message: "Deduplication cache cleared".to_string(),
        cleared,
    })
}

// ---------------------------------------------------------------------------
// Listing-site scraper
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/playwright-scraper/scrape",
    request_body = ListingScrapeRequest,
    responses(
        (status = 202, description = "Job started", body = StartJobResponse),
        (status = 400, description = "Bad request", body = crate::dto::ErrorResponse),
    ),
    tag = "listings"
)]
pub async fn start_listing_job<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    payload: Result<Json<ListingScrapeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let Json(body) = payload?;
    let sites = body.target_sites()?;
    let job = state
        .orchestrator
        .start_scrape_job(&body.query, &sites, body.max_listings)?;

    Ok((StatusCode::ACCEPTED, Json(StartJobResponse::from(job))))
}

#[utoipa::path(
    get,
    path = "/api/playwright-scraper/status/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = JobStatusResponse),
        (status = 404, description = "Not found", body = crate::dto::ErrorResponse),
    ),
    tag = "listings"
)]
pub async fn listing_job_status<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    job_status(&state, &job_id)
}

#[utoipa::path(
    get,
    path = "/api/playwright-scraper/jobs",
    responses(
        (status = 200, description = "Listing jobs", body = JobListResponse),
    ),
    tag = "listings"
)]
pub async fn list_listing_jobs<S, R>(State(state): State<Arc<AppState<S, R>>>) -> impl IntoResponse
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    job_list(&state, JobKind::Listing)
}

#[utoipa::path(
    post,
    path = "/api/playwright-scraper/quick-scrape",
    request_body = ListingScrapeRequest,
    responses(
        (status = 200, description = "Finished listing job summary", body = QuickScrapeResponse),
        (status = 400, description = "Bad request", body = crate::dto::ErrorResponse),
        (status = 500, description = "Job failed", body = crate::dto::ErrorResponse),
    ),
    tag = "listings"
)]
pub async fn quick_scrape<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    payload: Result<Json<ListingScrapeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let Json(body) = payload?;
    let sites = body.target_sites()?;
    let summary = state
        .orchestrator
        .quick_scrape(&body.query, &sites, body.max_listings)
        .await?;

    Ok(Json(QuickScrapeResponse::new(body.query, &sites, summary)))
}

fn job_status<S, R>(state: &AppState<S, R>, job_id: &str) -> Result<impl IntoResponse + use<S, R>, ApiError>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let job = state.orchestrator.get_job_status(job_id)?;
    Ok(Json(JobStatusResponse {
        success: true,
        job: JobResponse::from(job),
    }))
}

fn job_list<S, R>(state: &AppState<S, R>, kind: JobKind) -> Json<JobListResponse>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let jobs: Vec<JobResponse> = state
        .orchestrator
        .list_jobs(Some(kind))
        .into_iter()
        .map(JobResponse::from)
        .collect();
    let total = jobs.len();

    Json(JobListResponse {
        success: true,
        jobs,
        total,
    })
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database is unreachable", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health<S, R>(State(state): State<Arc<AppState<S, R>>>) -> impl IntoResponse
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    let Some(db) = &state.database else {
        return (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                storage: "memory",
            }),
        );
    };

    match db.record_repo().health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                storage: "postgres",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy",
                    storage: "postgres",
                }),
            )
        }
    }
}
