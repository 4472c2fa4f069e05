use crate::job::{Job, QueryOutcome};

/// Events emitted over a job's lifetime for monitoring/logging.
#[derive(Debug, Clone)]
pub enum JobEvent<'a> {
    Submitted { job: &'a Job },
    Started { job_id: &'a str, queries: usize },
    QueryFinished { job_id: &'a str, outcome: &'a QueryOutcome },
    Completed { job: &'a Job },
    Failed { job: &'a Job, reason: &'a str },
}

/// Trait for receiving job events (decoupled logging).
pub trait JobReporter: Send + Sync {
    fn report(&self, event: JobEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingJobReporter;

impl JobReporter for TracingJobReporter {
    fn report(&self, event: JobEvent<'_>) {
        match event {
            JobEvent::Submitted { job } => {
                tracing::info!(
                    job_id = %job.id,
                    kind = ?job.kind,
                    queries = job.queries.len(),
                    "Job submitted"
                );
            }
            JobEvent::Started { job_id, queries } => {
                tracing::info!(%job_id, queries, "Job started");
            }
            JobEvent::QueryFinished { job_id, outcome } => match &outcome.error {
                Some(error) => tracing::warn!(
                    %job_id,
                    index = outcome.index,
                    query = %outcome.query,
                    site = ?outcome.site,
                    %error,
                    "Query failed"
                ),
                None => tracing::info!(
                    %job_id,
                    index = outcome.index,
                    query = %outcome.query,
                    site = ?outcome.site,
                    tool = ?outcome.tool,
                    found = outcome.found,
                    saved = outcome.saved,
                    duplicates = outcome.duplicates,
                    "Query finished"
                ),
            },
            JobEvent::Completed { job } => {
                tracing::info!(
                    job_id = %job.id,
                    total_found = job.total_found,
                    total_saved = job.total_saved,
                    errors = job.errors.len(),
                    duration_ms = ?job.duration_ms(),
                    "Job completed"
                );
            }
            JobEvent::Failed { job, reason } => {
                tracing::warn!(
                    job_id = %job.id,
                    %reason,
                    errors = job.errors.len(),
                    "Job failed"
                );
            }
        }
    }
}
