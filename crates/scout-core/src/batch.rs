//! Batch execution of scrape queries.
//!
//! A batch job runs its queries through the fallback chain with bounded
//! concurrency. Each query's records are validated, deduplicated, capped and
//! stored independently: a failing query or record is folded into the job's
//! error list and never aborts the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::dedup::Deduplicator;
use crate::error::AppError;
use crate::events::{JobEvent, JobReporter, TracingJobReporter};
use crate::fallback::FallbackChain;
use crate::job::{Job, JobKind, JobStatus, JobTable, QueryOutcome, SkippedRecord};
use crate::models::{MAX_RESULTS_CAP, ScrapeQuery};
use crate::traits::{RecordStore, SiteFetcher};
use crate::validate::RecordValidator;

/// Upper bound on queries in one job.
pub const MAX_QUERIES_PER_JOB: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Queries executing at the same time within one job.
    pub max_concurrency: usize,
    /// Wall-clock budget for a whole job.
    pub job_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            job_timeout: Duration::from_secs(600),
        }
    }
}

/// Everything one query contributed to its job.
struct QueryReport {
    outcome: QueryOutcome,
    skipped: Vec<SkippedRecord>,
    errors: Vec<String>,
}

pub struct BatchProcessor<S, R> {
    chain: Arc<FallbackChain<S>>,
    store: R,
    dedup: Deduplicator,
    validator: Arc<RecordValidator>,
    jobs: JobTable,
    config: BatchConfig,
    reporter: Arc<dyn JobReporter>,
    shutdown: CancellationToken,
}

impl<S, R: Clone> Clone for BatchProcessor<S, R> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            store: self.store.clone(),
            dedup: self.dedup.clone(),
            validator: Arc::clone(&self.validator),
            jobs: self.jobs.clone(),
            config: self.config.clone(),
            reporter: Arc::clone(&self.reporter),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S, R> BatchProcessor<S, R>
where
    S: SiteFetcher,
    R: RecordStore,
{
    pub fn new(
        chain: Arc<FallbackChain<S>>,
        store: R,
        dedup: Deduplicator,
        config: BatchConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            chain,
            store,
            dedup,
            validator: Arc::new(RecordValidator::new()?),
            jobs: JobTable::new(),
            config,
            reporter: Arc::new(TracingJobReporter),
            shutdown: CancellationToken::new(),
        })
    }

    /// Share an existing job table.
    pub fn with_jobs(mut self, jobs: JobTable) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn JobReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Running jobs are failed as soon as `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Validate `queries` and register a pending job for them.
    pub fn submit(&self, kind: JobKind, queries: Vec<ScrapeQuery>) -> Result<Job, AppError> {
        if queries.is_empty() || queries.len() > MAX_QUERIES_PER_JOB {
            return Err(AppError::ValidationError(format!(
                "A job needs between 1 and {MAX_QUERIES_PER_JOB} queries, got {}",
                queries.len()
            )));
        }
        for (i, query) in queries.iter().enumerate() {
            query.validate().map_err(|e| match e {
                AppError::ValidationError(msg) => {
                    AppError::ValidationError(format!("queries[{i}]: {msg}"))
                }
                other => other,
            })?;
        }
        let job = Job::new(kind, queries);
        self.reporter.report(JobEvent::Submitted { job: &job });
        self.jobs.insert(job.clone());
        Ok(job)
    }

    /// Run a batch of queries to completion and return the finished job.
    pub async fn run_batch_job(&self, queries: Vec<ScrapeQuery>) -> Result<Job, AppError> {
        let job = self.submit(JobKind::Batch, queries)?;
        self.run(&job.id).await
    }

    pub fn get_job(&self, id: &str) -> Result<Job, AppError> {
        self.jobs
            .get(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))
    }

    pub fn list_jobs(&self, kind: Option<JobKind>) -> Vec<Job> {
        self.jobs.list(kind)
    }

    /// Execute a pending job. Returns its terminal snapshot.
    pub async fn run(&self, job_id: &str) -> Result<Job, AppError> {
        let job = self.jobs.update(job_id, |job| {
            job.transition(JobStatus::Running);
        })?;
        if job.status != JobStatus::Running {
            return Ok(job);
        }
        self.reporter.report(JobEvent::Started {
            job_id,
            queries: job.queries.len(),
        });

        let width = self.config.max_concurrency.max(1);
        let work = futures::stream::iter(job.queries.into_iter().enumerate())
            .map(|(index, query)| self.process_query(index, query))
            .buffer_unordered(width)
            .for_each(|report| {
                self.reporter.report(JobEvent::QueryFinished {
                    job_id,
                    outcome: &report.outcome,
                });
                let applied = self.jobs.update(job_id, |job| {
                    job.apply(report.outcome, report.skipped, report.errors)
                });
                if let Err(e) = applied {
                    tracing::error!(%job_id, error = %e, "Failed to record query outcome");
                }
                futures::future::ready(())
            });

        let abort_reason = tokio::select! {
            finished = tokio::time::timeout(self.config.job_timeout, work) => match finished {
                Ok(()) => None,
                Err(_) => Some(format!(
                    "Job timed out after {}s",
                    self.config.job_timeout.as_secs()
                )),
            },
            () = self.shutdown.cancelled() => Some("Job aborted: shutting down".to_string()),
        };

        let job = self.jobs.update(job_id, |job| match &abort_reason {
            Some(reason) => {
                job.errors.push(reason.clone());
                job.transition(JobStatus::Failed);
            }
            None => {
                let all_failed = !job.outcomes.is_empty()
                    && job.outcomes.len() == job.queries.len()
                    && job.outcomes.iter().all(|o| o.error.is_some());
                if all_failed {
                    job.transition(JobStatus::Failed);
                } else {
                    job.transition(JobStatus::Completed);
                }
            }
        })?;

        match job.status {
            JobStatus::Failed => {
                let reason = abort_reason.as_deref().unwrap_or("every query failed");
                self.reporter.report(JobEvent::Failed { job: &job, reason });
            }
            _ => self.reporter.report(JobEvent::Completed { job: &job }),
        }
        Ok(job)
    }

    /// Mark a job failed without running it further (e.g. its task was lost).
    pub fn fail(&self, job_id: &str, reason: &str) -> Result<Job, AppError> {
        let mut failed = false;
        let job = self.jobs.update(job_id, |job| {
            // A job that never started still passes through running.
            if job.status == JobStatus::Pending {
                job.transition(JobStatus::Running);
            }
            job.errors.push(reason.to_string());
            failed = job.transition(JobStatus::Failed);
        })?;
        if failed {
            self.reporter.report(JobEvent::Failed { job: &job, reason });
        }
        Ok(job)
    }

    /// Fetch → validate → deduplicate → cap → store, for one query.
    async fn process_query(&self, index: usize, query: ScrapeQuery) -> QueryReport {
        let mut outcome = QueryOutcome::new(index, &query);
        let mut skipped = Vec::new();
        let mut errors = Vec::new();

        let result = self.chain.collect(&query).await;
        outcome.tool = result.tool;
        if !result.success {
            let error = result
                .error
                .unwrap_or_else(|| "unknown scraping failure".to_string());
            let label = match outcome.site {
                Some(site) => format!("{} ({})", query.query, site.display_name()),
                None => query.query.clone(),
            };
            errors.push(format!("{label}: {error}"));
            outcome.error = Some(error);
            return QueryReport {
                outcome,
                skipped,
                errors,
            };
        }
        outcome.found = result.data.len();

        let mut valid = Vec::with_capacity(result.data.len());
        for record in result.data {
            match self.validator.validate(&record) {
                Ok(()) => valid.push(record),
                Err(reason) => skipped.push(SkippedRecord {
                    title: record.title,
                    reason: format!("invalid record: {reason}"),
                }),
            }
        }

        let limit = query.max_results.min(MAX_RESULTS_CAP);
        let dedup = self.dedup.filter_new_up_to(valid, limit);
        outcome.duplicates = dedup.duplicates;
        skipped.extend(dedup.overflow.into_iter().map(|record| SkippedRecord {
            title: record.title,
            reason: format!("over the limit of {limit} results"),
        }));

        // Fingerprints stay pending until their insert settles. If this future
        // is dropped (job timeout, shutdown) the unstored ones are forgotten.
        let fresh: Vec<_> = dedup
            .fresh
            .into_iter()
            .map(|(fingerprint, record)| (self.dedup.pending(fingerprint), record))
            .collect();
        for (pending, record) in fresh {
            match self.store.insert(&record, pending.fingerprint()).await {
                Ok(_) => {
                    pending.commit();
                    outcome.saved += 1;
                }
                Err(AppError::Duplicate(_)) => {
                    pending.commit();
                    skipped.push(SkippedRecord {
                        title: record.title,
                        reason: "already stored".to_string(),
                    });
                }
                // Dropping `pending` lets a later run pick the record up again.
                Err(e) => errors.push(format!("{}: {e}", record.title)),
            }
        }

        outcome.skipped = skipped.len();
        QueryReport {
            outcome,
            skipped,
            errors,
        }
    }
}
