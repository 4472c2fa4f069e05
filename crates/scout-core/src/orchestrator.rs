//! Public entry point of the scraping pipeline.
//!
//! The orchestrator owns the fallback chain, the deduplication cache and the
//! job table, and exposes them as job-oriented operations: background listing
//! jobs, synchronous quick scrapes, batch jobs, status lookups and stats.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::batch::{BatchConfig, BatchProcessor};
use crate::config::ScraperConfig;
use crate::dedup::Deduplicator;
use crate::error::AppError;
use crate::events::JobReporter;
use crate::fallback::{FallbackChain, ToolStats};
use crate::job::{Job, JobKind, JobStatus, JobTable};
use crate::models::{MAX_RESULTS_CAP, QueryType, ScrapeQuery, ScrapeResult};
use crate::site::Site;
use crate::throttle::HostThrottle;
use crate::traits::{RecordStore, SiteFetcher};

/// Result of a synchronous listing scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickScrapeSummary {
    pub job_id: String,
    pub found: usize,
    pub saved: usize,
    pub errors: Vec<String>,
}

/// Pipeline-wide counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorStats {
    pub tools: Vec<ToolStats>,
    pub cache_size: usize,
    /// Job count per status.
    pub jobs: BTreeMap<String, usize>,
}

struct Inner<S, R> {
    chain: Arc<FallbackChain<S>>,
    batch: BatchProcessor<S, R>,
    dedup: Deduplicator,
    jobs: JobTable,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Cheaply cloneable handle; clones share all state.
pub struct ScrapeOrchestrator<S, R> {
    inner: Arc<Inner<S, R>>,
}

impl<S, R> Clone for ScrapeOrchestrator<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, R> ScrapeOrchestrator<S, R>
where
    S: SiteFetcher + 'static,
    R: RecordStore + 'static,
{
    /// Build an orchestrator over `strategies` (already in fallback order).
    pub fn new(strategies: Vec<S>, store: R, config: &ScraperConfig) -> Result<Self, AppError> {
        let chain = FallbackChain::new(
            strategies,
            HostThrottle::new(config.throttle.clone()),
            config.chain_config(),
        );
        Self::from_chain(chain, store, config.batch_config())
    }

    pub fn from_chain(
        chain: FallbackChain<S>,
        store: R,
        batch_config: BatchConfig,
    ) -> Result<Self, AppError> {
        let chain = Arc::new(chain);
        let dedup = Deduplicator::new();
        let jobs = JobTable::new();
        let shutdown = CancellationToken::new();
        let batch = BatchProcessor::new(Arc::clone(&chain), store, dedup.clone(), batch_config)?
            .with_jobs(jobs.clone())
            .with_shutdown(shutdown.clone());

        tracing::info!(tools = ?chain.tools(), "Scrape orchestrator ready");
        Ok(Self {
            inner: Arc::new(Inner {
                chain,
                batch,
                dedup,
                jobs,
                shutdown,
                tasks: TaskTracker::new(),
            }),
        })
    }

    /// Replace the job event reporter. Only valid before the handle is shared.
    pub fn with_reporter(self, reporter: Arc<dyn JobReporter>) -> Result<Self, AppError> {
        let inner = Arc::try_unwrap(self.inner).map_err(|_| {
            AppError::Generic("Cannot change the reporter of a shared orchestrator".into())
        })?;
        Ok(Self {
            inner: Arc::new(Inner {
                batch: inner.batch.with_reporter(reporter),
                ..inner
            }),
        })
    }

    /// One vehicle query per listing site, so errors and throttling are per site.
    fn listing_queries(
        query: &str,
        sites: &[Site],
        max_listings: usize,
    ) -> Result<Vec<ScrapeQuery>, AppError> {
        if sites.is_empty() {
            return Err(AppError::ValidationError("sites must not be empty".into()));
        }
        if let Some(site) = sites.iter().find(|s| !s.is_listing()) {
            return Err(AppError::ValidationError(format!(
                "{site} is not a listing site"
            )));
        }
        if max_listings == 0 || max_listings > MAX_RESULTS_CAP {
            return Err(AppError::ValidationError(format!(
                "maxListings must be between 1 and {MAX_RESULTS_CAP}, got {max_listings}"
            )));
        }
        let queries: Vec<ScrapeQuery> = sites
            .iter()
            .map(|site| {
                ScrapeQuery::new(query.trim(), QueryType::Vehicle)
                    .with_max_results(max_listings)
                    .with_sites(vec![*site])
            })
            .collect();
        for q in &queries {
            q.validate()?;
        }
        Ok(queries)
    }

    /// Submit a listing job and run it in the background.
    ///
    /// Returns the pending job immediately; poll [`get_job_status`](Self::get_job_status)
    /// for progress.
    pub fn start_scrape_job(
        &self,
        query: &str,
        sites: &[Site],
        max_listings: usize,
    ) -> Result<Job, AppError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(AppError::Generic("Orchestrator is shutting down".into()));
        }
        let queries = Self::listing_queries(query, sites, max_listings)?;
        let job = self.inner.batch.submit(JobKind::Listing, queries)?;

        let batch = self.inner.batch.clone();
        let job_id = job.id.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = batch.run(&job_id).await {
                tracing::error!(%job_id, error = %e, "Background job crashed");
                mark_failed(&batch, &job_id, &e.to_string());
            }
        });
        Ok(job)
    }

    /// Run a listing job to completion and summarize it.
    pub async fn quick_scrape(
        &self,
        query: &str,
        sites: &[Site],
        max_listings: usize,
    ) -> Result<QuickScrapeSummary, AppError> {
        let queries = Self::listing_queries(query, sites, max_listings)?;
        let job = self.inner.batch.submit(JobKind::Listing, queries)?;
        let job = self.inner.batch.run(&job.id).await?;
        Ok(QuickScrapeSummary {
            job_id: job.id,
            found: job.total_found,
            saved: job.total_saved,
            errors: job.errors,
        })
    }

    /// Run a batch of queries to completion.
    pub async fn run_batch_job(&self, queries: Vec<ScrapeQuery>) -> Result<Job, AppError> {
        self.inner.batch.run_batch_job(queries).await
    }

    /// Scrape a single query through the fallback chain without storing.
    pub async fn scrape(&self, query: &ScrapeQuery) -> ScrapeResult {
        self.inner.chain.scrape_with_fallback(query).await
    }

    pub fn get_job_status(&self, job_id: &str) -> Result<Job, AppError> {
        self.inner.batch.get_job(job_id)
    }

    pub fn list_jobs(&self, kind: Option<JobKind>) -> Vec<Job> {
        self.inner.batch.list_jobs(kind)
    }

    /// Clear the deduplication cache. Returns how many fingerprints were dropped.
    pub fn clear_cache(&self) -> usize {
        self.inner.dedup.clear()
    }

    pub fn stats(&self) -> OrchestratorStats {
        let mut jobs = BTreeMap::new();
        for job in self.inner.jobs.list(None) {
            *jobs.entry(job.status.as_str().to_string()).or_insert(0) += 1;
        }
        OrchestratorStats {
            tools: self.inner.chain.stats(),
            cache_size: self.inner.dedup.len(),
            jobs,
        }
    }

    /// Stop accepting background jobs and abort every running one, without
    /// waiting. In-flight `quick_scrape` and `run_batch_job` calls return
    /// their failed job promptly.
    pub fn begin_shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::info!("Scrape orchestrator shutting down");
        }
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
    }

    /// Stop accepting background jobs, fail those still running, and wait for
    /// their tasks to finish.
    pub async fn shutdown(&self) {
        self.begin_shutdown();
        self.inner.tasks.wait().await;

        for job_id in self.inner.jobs.active_ids() {
            mark_failed(&self.inner.batch, &job_id, "Job aborted: shutting down");
        }
    }
}

/// Fail a job whose run did not finish it. Returns whether it was marked.
fn mark_failed<S, R>(batch: &BatchProcessor<S, R>, job_id: &str, reason: &str) -> bool
where
    S: SiteFetcher,
    R: RecordStore,
{
    match batch.fail(job_id, reason) {
        Ok(job) => job.status == JobStatus::Failed,
        Err(e) => {
            tracing::warn!(%job_id, error = %e, "Failed to mark job as failed");
            false
        }
    }
}
