use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ScrapeQuery, ScrapedRecord, ToolKind};
use crate::site::Site;

/// Fetches raw HTML content from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// One scraping strategy: fetches records for a query from a single site.
///
/// Implementations return raw extracted records; capping, validation and
/// deduplication happen further up the pipeline.
pub trait SiteFetcher: Send + Sync {
    fn tool(&self) -> ToolKind;

    /// Whether the strategy has what it needs to run (API key, browser).
    fn is_configured(&self) -> bool {
        true
    }

    fn supports(&self, site: Site) -> bool;

    /// Host the request for `site` goes to. Requests sharing a host are
    /// spaced by the throttle.
    fn request_host(&self, site: Site) -> String;

    fn fetch(
        &self,
        site: Site,
        query: &ScrapeQuery,
        max_results: usize,
    ) -> impl Future<Output = Result<Vec<ScrapedRecord>, AppError>> + Send;
}

/// A record as stored by a [`RecordStore`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: Uuid,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Persists scraped records.
pub trait RecordStore: Send + Sync + Clone {
    /// Insert one record under its fingerprint.
    ///
    /// Fails with [`AppError::Duplicate`] when the fingerprint is already
    /// stored and [`AppError::PersistenceError`] for anything else.
    fn insert(
        &self,
        record: &ScrapedRecord,
        fingerprint: &str,
    ) -> impl Future<Output = Result<StoredRecord, AppError>> + Send;
}
