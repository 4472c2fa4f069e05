use scout_core::error::AppError;
use scout_core::models::ScrapedRecord;
use scout_core::store::MemoryStore;
use scout_core::traits::{RecordStore, StoredRecord};
use scout_core::ScrapeOrchestrator;
use scout_db::{Database, RecordRepository};

/// Shared application state, available to all route handlers via `State<Arc<AppState<S, R>>>`.
pub struct AppState<S, R> {
    pub orchestrator: ScrapeOrchestrator<S, R>,
    /// Present when records go to PostgreSQL; used by the health check.
    pub database: Option<Database>,
}

impl<S, R> AppState<S, R> {
    pub fn new(orchestrator: ScrapeOrchestrator<S, R>) -> Self {
        Self {
            orchestrator,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

/// Where the server keeps scraped records.
#[derive(Clone)]
pub enum Storage {
    Postgres(RecordRepository),
    /// Used when `DATABASE_URL` is unset.
    Memory(MemoryStore),
}

impl Storage {
    pub fn name(&self) -> &'static str {
        match self {
            Storage::Postgres(_) => "postgres",
            Storage::Memory(_) => "memory",
        }
    }
}

impl RecordStore for Storage {
    async fn insert(
        &self,
        record: &ScrapedRecord,
        fingerprint: &str,
    ) -> Result<StoredRecord, AppError> {
        match self {
            Storage::Postgres(repo) => repo.insert(record, fingerprint).await,
            Storage::Memory(store) => store.insert(record, fingerprint).await,
        }
    }
}
