use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ScrapedRecord;
use crate::traits::{RecordStore, StoredRecord};

/// In-process [`RecordStore`] keyed by fingerprint.
///
/// Used when no database is configured. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, (StoredRecord, ScrapedRecord)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (StoredRecord, ScrapedRecord)>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored records, oldest first.
    pub fn records(&self) -> Vec<ScrapedRecord> {
        let map = self.lock();
        let mut rows: Vec<_> = map.values().collect();
        rows.sort_by_key(|(stored, _)| stored.created_at);
        rows.into_iter().map(|(_, r)| r.clone()).collect()
    }
}

impl RecordStore for MemoryStore {
    async fn insert(
        &self,
        record: &ScrapedRecord,
        fingerprint: &str,
    ) -> Result<StoredRecord, AppError> {
        let mut map = self.lock();
        if map.contains_key(fingerprint) {
            return Err(AppError::Duplicate(fingerprint.to_string()));
        }
        let stored = StoredRecord {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        };
        map.insert(fingerprint.to_string(), (stored.clone(), record.clone()));
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryType;

    #[tokio::test]
    async fn rejects_repeated_fingerprint() {
        let store = MemoryStore::new();
        let record = ScrapedRecord::new(QueryType::Vehicle, "1967 Ford Mustang", "Hemmings.com");

        let stored = store.insert(&record, "abc").await.unwrap();
        assert_eq!(stored.fingerprint, "abc");

        let err = store.insert(&record, "abc").await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].title, "1967 Ford Mustang");
    }
}
