use chrono::{DateTime, Utc};
use scout_core::error::AppError;
use scout_core::models::ScrapedRecord;
use scout_core::traits::{RecordStore, StoredRecord};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Scraped-record persistence in PostgreSQL, keyed by fingerprint.
#[derive(Clone)]
pub struct RecordRepository {
    pool: Pool<Postgres>,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a record unless its fingerprint is already stored.
    ///
    /// Returns `Ok(None)` on a fingerprint conflict.
    pub async fn save(
        &self,
        record: &ScrapedRecord,
        fingerprint: &str,
    ) -> Result<Option<StoredRecord>, AppError> {
        let data = serde_json::to_value(record)?;
        let row = sqlx::query_as::<_, StoredRow>(
            r#"
            INSERT INTO scraped_records
                (fingerprint, record_type, title, source, url, year, make, model, price, location, data, scraped_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (fingerprint) DO NOTHING
            RETURNING id, fingerprint, created_at
            "#,
        )
        .bind(fingerprint)
        .bind(record.record_type.as_str())
        .bind(&record.title)
        .bind(&record.source)
        .bind(&record.url)
        .bind(record.year)
        .bind(&record.make)
        .bind(&record.model)
        .bind(record.price.and_then(|p| i64::try_from(p).ok()))
        .bind(&record.location)
        .bind(&data)
        .bind(record.scraped_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::PersistenceError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    pub async fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<ScrapedRecord>, AppError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as(r#"SELECT data FROM scraped_records WHERE fingerprint = $1"#)
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::PersistenceError(e.to_string()))?;

        row.map(|(data,)| serde_json::from_value(data).map_err(AppError::from))
            .transpose()
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM scraped_records"#)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(e.to_string()))?;
        Ok(count)
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct StoredRow {
    id: Uuid,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

impl From<StoredRow> for StoredRecord {
    fn from(row: StoredRow) -> Self {
        StoredRecord {
            id: row.id,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
        }
    }
}

// -- Trait implementation --

impl RecordStore for RecordRepository {
    async fn insert(
        &self,
        record: &ScrapedRecord,
        fingerprint: &str,
    ) -> Result<StoredRecord, AppError> {
        self.save(record, fingerprint)
            .await?
            .ok_or_else(|| AppError::Duplicate(fingerprint.to_string()))
    }
}
