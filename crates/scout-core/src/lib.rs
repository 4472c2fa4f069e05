pub mod batch;
pub mod circuit_breaker;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod fallback;
pub mod fetch;
pub mod job;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod site;
pub mod store;
pub mod throttle;
pub mod traits;
pub mod validate;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use batch::{BatchConfig, BatchProcessor, MAX_QUERIES_PER_JOB};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use config::ScraperConfig;
pub use dedup::{Deduplicator, PendingFingerprint, fingerprint};
pub use error::AppError;
pub use events::{JobEvent, JobReporter, TracingJobReporter};
pub use fallback::{ChainConfig, FallbackChain, ToolStats};
pub use job::{Job, JobKind, JobStatus, QueryOutcome, SkippedRecord};
pub use models::{
    MAX_RESULTS_CAP, QueryType, ScrapeMetadata, ScrapeQuery, ScrapeResult, ScrapedRecord,
    ToolAttempt, ToolKind, compute_hash,
};
pub use orchestrator::{OrchestratorStats, QuickScrapeSummary, ScrapeOrchestrator};
pub use site::Site;
pub use store::MemoryStore;
pub use throttle::{HostThrottle, ThrottleConfig};
pub use traits::{Fetcher, RecordStore, SiteFetcher, StoredRecord};
