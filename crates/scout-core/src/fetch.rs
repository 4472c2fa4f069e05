//! A single fetch attempt: one tool against one site.

use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::models::{
    ScrapeMetadata, ScrapeQuery, ScrapeResult, ScrapedRecord, ToolAttempt, validate_max_results,
};
use crate::site::Site;
use crate::traits::SiteFetcher;

/// Run one attempt under `timeout`, returning the typed outcome alongside its
/// attempt entry.
///
/// `max_results` outside `1..=MAX_RESULTS_CAP` fails without touching the
/// network.
pub async fn fetch_attempt<S: SiteFetcher>(
    fetcher: &S,
    site: Site,
    query: &ScrapeQuery,
    max_results: usize,
    timeout: Duration,
) -> (Result<Vec<ScrapedRecord>, AppError>, ToolAttempt) {
    let started = Instant::now();
    let outcome = match validate_max_results(max_results) {
        Err(e) => Err(e),
        Ok(()) => match tokio::time::timeout(timeout, fetcher.fetch(site, query, max_results)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        },
    };

    let attempt = ToolAttempt {
        tool: fetcher.tool(),
        site: Some(site),
        success: matches!(&outcome, Ok(records) if !records.is_empty()),
        records: outcome.as_ref().map(Vec::len).unwrap_or(0),
        error: match &outcome {
            Ok(records) if records.is_empty() => Some("no records found".to_string()),
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        },
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    match &outcome {
        Ok(records) => tracing::debug!(
            tool = %attempt.tool,
            site = %site,
            records = records.len(),
            elapsed_ms = attempt.elapsed_ms,
            "Fetch attempt finished"
        ),
        Err(e) => tracing::warn!(
            tool = %attempt.tool,
            site = %site,
            error = %e,
            elapsed_ms = attempt.elapsed_ms,
            "Fetch attempt failed"
        ),
    }

    (outcome, attempt)
}

/// Fetch `site` with a single strategy. Failures come back as
/// `success: false` with a descriptive error, never as a panic or `Err`.
pub async fn fetch_site<S: SiteFetcher>(
    fetcher: &S,
    site: Site,
    query: &ScrapeQuery,
    max_results: usize,
    timeout: Duration,
) -> ScrapeResult {
    let started = Instant::now();
    let (outcome, attempt) = fetch_attempt(fetcher, site, query, max_results, timeout).await;

    let mut metadata = ScrapeMetadata::new(query);
    metadata.sites = vec![site];
    metadata.attempts.push(attempt);
    metadata.execution_time_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(records) if !records.is_empty() => {
            metadata.total_found = records.len();
            ScrapeResult::succeeded(fetcher.tool(), records, metadata).capped(max_results)
        }
        Ok(_) => ScrapeResult::failed(Some(fetcher.tool()), "no records found", metadata),
        Err(e) => ScrapeResult::failed(Some(fetcher.tool()), e.to_string(), metadata),
    }
}
