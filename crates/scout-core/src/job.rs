use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ScrapeQuery, ToolKind};
use crate::site::Site;

/// Status of a scrape job.
///
/// Moves only `pending → running → {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_move_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Which API surface submitted the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// A list of arbitrary queries.
    Batch,
    /// One vehicle query fanned out to listing sites, one query per site.
    Listing,
}

impl JobKind {
    fn id_prefix(&self) -> &'static str {
        match self {
            JobKind::Batch => "batch",
            JobKind::Listing => "job",
        }
    }
}

/// A record dropped before storage, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecord {
    pub title: String,
    pub reason: String,
}

/// What happened to one query of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    /// Position of the query in the job's query list.
    pub index: usize,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolKind>,
    pub found: usize,
    pub saved: usize,
    pub duplicates: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn new(index: usize, query: &ScrapeQuery) -> Self {
        Self {
            index,
            query: query.query.clone(),
            site: match query.sites.as_deref() {
                Some([site]) => Some(*site),
                _ => None,
            },
            tool: None,
            found: 0,
            saved: 0,
            duplicates: 0,
            skipped: 0,
            error: None,
        }
    }
}

/// A scrape job and its aggregated results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub queries: Vec<ScrapeQuery>,
    pub sites: Vec<Site>,
    pub tools_used: Vec<ToolKind>,
    pub status: JobStatus,
    pub total_found: usize,
    pub total_saved: usize,
    pub duplicates: usize,
    pub skipped: Vec<SkippedRecord>,
    pub errors: Vec<String>,
    pub outcomes: Vec<QueryOutcome>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(kind: JobKind, queries: Vec<ScrapeQuery>) -> Self {
        let mut sites: Vec<Site> = Vec::new();
        for site in queries.iter().flat_map(ScrapeQuery::target_sites) {
            if !sites.contains(&site) {
                sites.push(site);
            }
        }
        Self {
            id: format!("{}_{}", kind.id_prefix(), Uuid::new_v4().simple()),
            kind,
            queries,
            sites,
            tools_used: Vec::new(),
            status: JobStatus::Pending,
            total_found: 0,
            total_saved: 0,
            duplicates: 0,
            skipped: Vec::new(),
            errors: Vec::new(),
            outcomes: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Elapsed time in milliseconds; `None` while the job is still going.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    /// Move to `next`, setting `end_time` on entering a terminal state.
    /// Illegal transitions (including any from a terminal state) are refused.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_move_to(next) {
            tracing::warn!(
                job_id = %self.id,
                from = %self.status,
                to = %next,
                "Refusing illegal job status transition"
            );
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        true
    }

    /// Fold one query's outcome into the job totals.
    pub fn apply(&mut self, outcome: QueryOutcome, skipped: Vec<SkippedRecord>, errors: Vec<String>) {
        self.total_found += outcome.found;
        self.total_saved += outcome.saved;
        self.duplicates += outcome.duplicates;
        if let Some(tool) = outcome.tool
            && !self.tools_used.contains(&tool)
        {
            self.tools_used.push(tool);
        }
        self.skipped.extend(skipped);
        self.errors.extend(errors);
        let pos = self
            .outcomes
            .partition_point(|o| o.index < outcome.index);
        self.outcomes.insert(pos, outcome);
    }
}

/// In-memory job table shared by the orchestrator and its batch processor.
///
/// Every mutation runs inside one lock scope, and terminal jobs are never
/// modified.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        self.jobs.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned job table mutex");
            poisoned.into_inner()
        })
    }

    pub fn insert(&self, job: Job) {
        self.lock().insert(job.id.clone(), job);
    }

    /// Apply `f` to a non-terminal job and return the updated snapshot.
    pub fn update<F>(&self, id: &str, f: F) -> Result<Job, AppError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
        if !job.status.is_terminal() {
            f(job);
        }
        Ok(job.clone())
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.lock().get(id).cloned()
    }

    /// Jobs of `kind` (or all), oldest first.
    pub fn list(&self, kind: Option<JobKind>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .lock()
            .values()
            .filter(|j| kind.is_none_or(|k| j.kind == k))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Ids of jobs that have not reached a terminal state.
    pub fn active_ids(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter(|j| !j.status.is_terminal())
            .map(|j| j.id.clone())
            .collect()
    }
}
