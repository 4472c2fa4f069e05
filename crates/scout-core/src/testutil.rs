//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit and integration tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability so clones share
//! state and tests can assert on recorded calls.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{JobEvent, JobReporter};
use crate::models::{QueryType, ScrapeQuery, ScrapedRecord, ToolKind};
use crate::site::Site;
use crate::traits::{Fetcher, RecordStore, SiteFetcher, StoredRecord};

/// Rebuild an error so scripted mocks can hand out the same failure more
/// than once.
pub fn clone_error(error: &AppError) -> AppError {
    match error {
        AppError::ValidationError(m) => AppError::ValidationError(m.clone()),
        AppError::HttpError(m) => AppError::HttpError(m.clone()),
        AppError::NetworkError(m) => AppError::NetworkError(m.clone()),
        AppError::Timeout(s) => AppError::Timeout(*s),
        AppError::Blocked { site, reason } => AppError::Blocked {
            site: site.clone(),
            reason: reason.clone(),
        },
        AppError::RateLimitExceeded(m) => AppError::RateLimitExceeded(m.clone()),
        AppError::ParseError(m) => AppError::ParseError(m.clone()),
        AppError::PersistenceError(m) => AppError::PersistenceError(m.clone()),
        AppError::Duplicate(m) => AppError::Duplicate(m.clone()),
        AppError::JobNotFound(m) => AppError::JobNotFound(m.clone()),
        AppError::ConfigError(m) => AppError::ConfigError(m.clone()),
        other => AppError::Generic(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock HTML fetcher that returns queued responses.
#[derive(Clone)]
pub struct MockFetcher {
    /// Each call pops the first element; when empty, returns a default page.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.urls.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockSiteFetcher
// ---------------------------------------------------------------------------

type Handler = dyn Fn(Site, &ScrapeQuery) -> Result<Vec<ScrapedRecord>, AppError> + Send + Sync;

/// Scriptable scraping strategy.
///
/// Responds through a handler closure, so a test can fail for one query and
/// succeed for another, or return different records per site.
#[derive(Clone)]
pub struct MockSiteFetcher {
    tool: ToolKind,
    handler: Arc<Handler>,
    sites: Option<HashSet<Site>>,
    configured: bool,
    delay: Duration,
    /// Every `(site, query)` this mock was asked to fetch.
    pub calls: Arc<Mutex<Vec<(Site, String)>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockSiteFetcher {
    /// A configured strategy supporting every site that finds nothing.
    pub fn new(tool: ToolKind) -> Self {
        Self {
            tool,
            handler: Arc::new(|_, _| Ok(Vec::new())),
            sites: None,
            configured: true,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always return these records.
    pub fn with_records(self, records: Vec<ScrapedRecord>) -> Self {
        self.with_handler(move |_, _| Ok(records.clone()))
    }

    /// Always fail with this error.
    pub fn with_error(self, error: AppError) -> Self {
        self.with_handler(move |_, _| Err(clone_error(&error)))
    }

    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: Fn(Site, &ScrapeQuery) -> Result<Vec<ScrapedRecord>, AppError> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Only support the given sites.
    pub fn with_sites(mut self, sites: &[Site]) -> Self {
        self.sites = Some(sites.iter().copied().collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of fetches that were in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl SiteFetcher for MockSiteFetcher {
    fn tool(&self) -> ToolKind {
        self.tool
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn supports(&self, site: Site) -> bool {
        self.sites.as_ref().is_none_or(|s| s.contains(&site))
    }

    fn request_host(&self, site: Site) -> String {
        format!("{}.{}.mock", site, self.tool)
    }

    async fn fetch(
        &self,
        site: Site,
        query: &ScrapeQuery,
        _max_results: usize,
    ) -> Result<Vec<ScrapedRecord>, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((site, query.query.clone()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.handler)(site, query)
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Record store that keeps inserts in memory and can be told to fail.
#[derive(Clone, Default)]
pub struct MockStore {
    pub saved: Arc<Mutex<Vec<(String, ScrapedRecord)>>>,
    fail_titles: Arc<Mutex<HashSet<String>>>,
    fail_all: Arc<Mutex<Option<String>>>,
    delay: Duration,
}

impl MockStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fail inserts of records with this title with a persistence error.
    pub fn failing_on_title(self, title: &str) -> Self {
        self.fail_titles.lock().unwrap().insert(title.to_string());
        self
    }

    /// Fail every insert with a persistence error.
    pub fn failing(self, message: &str) -> Self {
        *self.fail_all.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Sleep this long before every insert.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn saved_titles(&self) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.title.clone())
            .collect()
    }
}

impl RecordStore for MockStore {
    async fn insert(
        &self,
        record: &ScrapedRecord,
        fingerprint: &str,
    ) -> Result<StoredRecord, AppError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(msg) = self.fail_all.lock().unwrap().clone() {
            return Err(AppError::PersistenceError(msg));
        }
        if self.fail_titles.lock().unwrap().contains(&record.title) {
            return Err(AppError::PersistenceError(format!(
                "insert rejected for '{}'",
                record.title
            )));
        }
        let mut saved = self.saved.lock().unwrap();
        if saved.iter().any(|(fp, _)| fp == fingerprint) {
            return Err(AppError::Duplicate(fingerprint.to_string()));
        }
        saved.push((fingerprint.to_string(), record.clone()));
        Ok(StoredRecord {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Job reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl JobReporter for MockReporter {
    fn report(&self, event: JobEvent<'_>) {
        let label = match &event {
            JobEvent::Submitted { .. } => "Submitted",
            JobEvent::Started { .. } => "Started",
            JobEvent::QueryFinished { .. } => "QueryFinished",
            JobEvent::Completed { .. } => "Completed",
            JobEvent::Failed { .. } => "Failed",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// `n` distinct vehicle listings on ClassicCars.com, numbered from `start`.
pub fn make_listings(start: usize, n: usize) -> Vec<ScrapedRecord> {
    (start..start + n)
        .map(|i| {
            ScrapedRecord::new(
                QueryType::Vehicle,
                format!("1967 Ford Mustang Fastback #{i}"),
                "ClassicCars.com",
            )
            .with_url(format!("https://classiccars.com/listings/view/{i}"))
        })
        .collect()
}
