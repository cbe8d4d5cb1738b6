//! In-memory catalog store for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{CatalogError, CatalogResult};
use crate::models::CatalogItem;
use crate::record::CatalogRecord;
use crate::store::{CatalogStore, UpsertOutcome, Upserted, is_dirty, merge_extended};

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<i64, CatalogItem>,
    next_id: i64,
    /// Remaining injected upsert failures per tmdb_id
    failures: HashMap<i64, usize>,
    /// Ids whose upserts always fail with a permanent error
    rejected: HashSet<i64>,
    attempts: HashMap<i64, usize>,
}

impl Inner {
    fn next_row_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn write(&mut self, record: &CatalogRecord) -> Upserted {
        let now = Utc::now();

        if let Some(existing) = self.items.get_mut(&record.tmdb_id) {
            if !is_dirty(existing, record) {
                return Upserted {
                    item: existing.clone(),
                    outcome: UpsertOutcome::Unchanged,
                };
            }

            let extended = match &record.extended {
                Some(incoming) => merge_extended(&existing.extended, incoming),
                None => existing.extended.clone(),
            };
            *existing = CatalogItem {
                id: existing.id,
                extended,
                created_at: existing.created_at,
                updated_at: Some(now),
                ..record.to_transient()
            };
            return Upserted {
                item: existing.clone(),
                outcome: UpsertOutcome::Updated,
            };
        }

        let item = CatalogItem {
            id: Some(self.next_row_id()),
            created_at: Some(now),
            updated_at: Some(now),
            ..record.to_transient()
        };
        self.items.insert(record.tmdb_id, item.clone());
        Upserted {
            item,
            outcome: UpsertOutcome::Inserted,
        }
    }
}

/// Catalog store backed by a single map, one row per `tmdb_id`.
///
/// Upserts for chosen ids can be made to fail to exercise retry paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a record, bypassing injected failures
    pub async fn seed(&self, record: CatalogRecord) -> CatalogItem {
        self.inner.lock().await.write(&record).item
    }

    /// Fail the next `times` upserts of `tmdb_id` (`usize::MAX` for always)
    pub async fn fail_upserts(&self, tmdb_id: i64, times: usize) {
        self.inner.lock().await.failures.insert(tmdb_id, times);
    }

    /// Refuse every upsert of `tmdb_id` with a non-retryable error
    pub async fn reject_upserts(&self, tmdb_id: i64) {
        self.inner.lock().await.rejected.insert(tmdb_id);
    }

    /// Upserts attempted for `tmdb_id`, failed ones included
    pub async fn upsert_attempts(&self, tmdb_id: i64) -> usize {
        self.inner
            .lock()
            .await
            .attempts
            .get(&tmdb_id)
            .copied()
            .unwrap_or(0)
    }

    /// Look an item up by its row id
    pub async fn get_by_row_id(&self, id: i64) -> Option<CatalogItem> {
        self.inner
            .lock()
            .await
            .items
            .values()
            .find(|item| item.id == Some(id))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn get_by_tmdb_id(&self, tmdb_id: i64) -> CatalogResult<Option<CatalogItem>> {
        Ok(self.inner.lock().await.items.get(&tmdb_id).cloned())
    }

    async fn get_many_by_tmdb_ids(
        &self,
        tmdb_ids: &[i64],
    ) -> CatalogResult<HashMap<i64, CatalogItem>> {
        let inner = self.inner.lock().await;
        Ok(tmdb_ids
            .iter()
            .filter_map(|id| inner.items.get(id).map(|item| (*id, item.clone())))
            .collect())
    }

    async fn upsert(&self, record: &CatalogRecord) -> CatalogResult<Upserted> {
        let mut inner = self.inner.lock().await;
        *inner.attempts.entry(record.tmdb_id).or_default() += 1;

        if inner.rejected.contains(&record.tmdb_id) {
            return Err(CatalogError::Rejected(format!(
                "record {} violates a constraint",
                record.tmdb_id
            )));
        }

        if let Some(remaining) = inner.failures.get_mut(&record.tmdb_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CatalogError::Storage(format!(
                    "injected failure for {}",
                    record.tmdb_id
                )));
            }
        }

        Ok(inner.write(record))
    }

    async fn ensure_placeholder(&self, tmdb_id: i64) -> CatalogResult<CatalogItem> {
        let mut inner = self.inner.lock().await;
        if let Some(item) = inner.items.get(&tmdb_id) {
            return Ok(item.clone());
        }

        let now = Utc::now();
        let item = CatalogItem {
            id: Some(inner.next_row_id()),
            created_at: Some(now),
            updated_at: Some(now),
            ..CatalogItem::placeholder(tmdb_id)
        };
        inner.items.insert(tmdb_id, item.clone());
        Ok(item)
    }

    async fn list(&self, limit: i64) -> CatalogResult<Vec<CatalogItem>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<CatalogItem> = inner.items.values().cloned().collect();
        items.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| a.id.cmp(&b.id))
        });
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn search_title(&self, query: &str, limit: i64) -> CatalogResult<Vec<CatalogItem>> {
        let needle = query.trim().to_lowercase();
        let mut matches = self.list(i64::MAX).await?;
        matches.retain(|item| {
            item.title.to_lowercase().contains(&needle)
                || item.overview.to_lowercase().contains(&needle)
        });
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }
}
