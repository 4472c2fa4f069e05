use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Scout API",
        version = "0.1.0",
        description = "Multi-source classic-car scraping with tool fallback, deduplication and background jobs."
    ),
    paths(
        crate::routes::scrape,
        crate::routes::batch,
        crate::routes::stats,
        crate::routes::list_batch_jobs,
        crate::routes::get_batch_job,
        crate::routes::clear_cache,
        crate::routes::start_listing_job,
        crate::routes::listing_job_status,
        crate::routes::list_listing_jobs,
        crate::routes::quick_scrape,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::ScrapeRequest,
        crate::dto::ScrapeResponse,
        crate::dto::BatchRequest,
        crate::dto::BatchResponse,
        crate::dto::JobResponse,
        crate::dto::JobListResponse,
        crate::dto::JobStatusResponse,
        crate::dto::ListingScrapeRequest,
        crate::dto::StartJobResponse,
        crate::dto::QuickScrapeResponse,
        crate::dto::StatsResponse,
        crate::dto::ClearCacheResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "scraper", description = "Multi-tool scraping, batch jobs and cache"),
        (name = "listings", description = "Classic-car listing site jobs"),
        (name = "system", description = "Health and system status"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/scraper/scrape",
            "/api/scraper/batch",
            "/api/scraper/stats",
            "/api/scraper/jobs",
            "/api/scraper/jobs/{job_id}",
            "/api/scraper/clear-cache",
            "/api/playwright-scraper/scrape",
            "/api/playwright-scraper/status/{job_id}",
            "/api/playwright-scraper/jobs",
            "/api/playwright-scraper/quick-scrape",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
