//! Cross-run record deduplication.
//!
//! Every record is reduced to a fingerprint: a SHA-256 over its type and
//! normalized identifying fields. The [`Deduplicator`] remembers fingerprints
//! for its whole lifetime (until [`Deduplicator::clear`]), so a record seen in
//! one run is never reported as new in a later one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{QueryType, ScrapedRecord, compute_hash};

/// Lowercase, trim and collapse internal whitespace.
fn norm(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized URL: fragment and trailing slash removed.
fn norm_url(url: &str) -> String {
    let url = norm(url);
    let url = url.split('#').next().unwrap_or_default();
    url.trim_end_matches('/').to_string()
}

fn opt(field: &Option<String>) -> String {
    field.as_deref().map(norm).unwrap_or_default()
}

/// Identity key of a record before hashing.
fn identity(record: &ScrapedRecord) -> String {
    let url = record.url.as_deref().map(norm_url).filter(|u| !u.is_empty());
    match record.record_type {
        QueryType::Vehicle => {
            if let Some(stock) = record.stock_number.as_deref().map(norm).filter(|s| !s.is_empty()) {
                format!("stock:{stock}")
            } else if let Some(url) = url {
                format!("url:{url}")
            } else {
                format!(
                    "{}|{}|{}|{}|{}",
                    record.year.map(|y| y.to_string()).unwrap_or_default(),
                    opt(&record.make),
                    opt(&record.model),
                    opt(&record.location),
                    norm(&record.title),
                )
            }
        }
        QueryType::Event => format!(
            "{}|{}|{}",
            norm(&record.title),
            opt(&record.date),
            opt(&record.location)
        ),
        QueryType::Article | QueryType::General => match url {
            Some(url) => format!("url:{url}"),
            None => norm(&record.title),
        },
    }
}

/// Stable fingerprint of a record's identity.
pub fn fingerprint(record: &ScrapedRecord) -> String {
    compute_hash(&format!("{}:{}", record.record_type, identity(record)))
}

/// Result of [`Deduplicator::filter_new_up_to`].
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Unseen records, now marked as seen, paired with their fingerprints.
    pub fresh: Vec<(String, ScrapedRecord)>,
    /// Records whose fingerprint was already known (or repeated in the input).
    pub duplicates: usize,
    /// Unseen records beyond the limit. Not marked as seen.
    pub overflow: Vec<ScrapedRecord>,
}

/// Shared cache of seen fingerprints.
///
/// Clones share the same cache. Every check-and-insert runs under a single
/// lock acquisition, so concurrent batches never both accept the same record.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.seen.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned dedup cache mutex");
            poisoned.into_inner()
        })
    }

    /// Keep only records not seen before, marking them as seen.
    /// Repeats inside `records` are collapsed to their first occurrence.
    pub fn filter_new(&self, records: Vec<ScrapedRecord>) -> Vec<ScrapedRecord> {
        self.filter_new_up_to(records, usize::MAX)
            .fresh
            .into_iter()
            .map(|(_, r)| r)
            .collect()
    }

    /// Like [`filter_new`](Self::filter_new) but accepts at most `limit` fresh
    /// records; the rest are returned as overflow and stay unseen so a later
    /// run can still pick them up.
    pub fn filter_new_up_to(&self, records: Vec<ScrapedRecord>, limit: usize) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        let mut seen = self.lock();
        let mut overflow_keys = HashSet::new();

        for record in records {
            let fp = fingerprint(&record);
            if seen.contains(&fp) || overflow_keys.contains(&fp) {
                outcome.duplicates += 1;
            } else if outcome.fresh.len() < limit {
                seen.insert(fp.clone());
                outcome.fresh.push((fp, record));
            } else {
                overflow_keys.insert(fp);
                outcome.overflow.push(record);
            }
        }
        outcome
    }

    /// Hold a freshly accepted fingerprint until its record is stored.
    ///
    /// Dropping the returned guard without [`PendingFingerprint::commit`]
    /// forgets the fingerprint again.
    pub fn pending(&self, fingerprint: String) -> PendingFingerprint {
        PendingFingerprint {
            dedup: self.clone(),
            fingerprint,
            committed: false,
        }
    }

    /// Drop one fingerprint so the record counts as new again.
    pub fn forget(&self, fingerprint: &str) -> bool {
        self.lock().remove(fingerprint)
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.lock().contains(fingerprint)
    }

    /// Forget every fingerprint. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut seen = self.lock();
        let dropped = seen.len();
        seen.clear();
        tracing::info!(dropped, "Deduplication cache cleared");
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fingerprint marked as seen whose record has not been stored yet.
#[derive(Debug)]
#[must_use = "dropping the guard forgets the fingerprint"]
pub struct PendingFingerprint {
    dedup: Deduplicator,
    fingerprint: String,
    committed: bool,
}

impl PendingFingerprint {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Keep the fingerprint in the cache for good.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingFingerprint {
    fn drop(&mut self) {
        if !self.committed {
            self.dedup.forget(&self.fingerprint);
        }
    }
}
