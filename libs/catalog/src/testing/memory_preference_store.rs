//! In-memory preference store for testing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::MemoryCatalogStore;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    CatalogItem, PreferenceCounts, PreferenceFlags, Rating, SavedItem, SavedList,
};
use crate::preferences::PreferenceStore;
use crate::store::CatalogStore;

#[derive(Debug, Clone)]
struct SavedEntry {
    id: i64,
    list: SavedList,
    user_id: Uuid,
    item_id: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RatingEntry {
    id: i64,
    user_id: Uuid,
    item_id: i64,
    rating: i16,
    review: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    saved: Vec<SavedEntry>,
    ratings: Vec<RatingEntry>,
    next_id: i64,
}

/// Preference store resolving items through a [`MemoryCatalogStore`]
#[derive(Debug, Clone)]
pub struct MemoryPreferenceStore {
    catalog: Arc<MemoryCatalogStore>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryPreferenceStore {
    pub fn new(catalog: Arc<MemoryCatalogStore>) -> Self {
        Self {
            catalog,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    async fn item(&self, item_id: i64) -> CatalogResult<CatalogItem> {
        self.catalog
            .get_by_row_id(item_id)
            .await
            .ok_or_else(|| CatalogError::Storage(format!("no catalog row {}", item_id)))
    }

    async fn row_id(&self, tmdb_id: i64) -> CatalogResult<Option<i64>> {
        Ok(self
            .catalog
            .get_by_tmdb_id(tmdb_id)
            .await?
            .and_then(|item| item.id))
    }

    async fn to_saved(&self, entry: SavedEntry) -> CatalogResult<SavedItem> {
        Ok(SavedItem {
            id: entry.id,
            user_id: entry.user_id,
            item: self.item(entry.item_id).await?,
            created_at: entry.created_at,
        })
    }

    async fn to_rating(&self, entry: RatingEntry) -> CatalogResult<Rating> {
        Ok(Rating {
            id: entry.id,
            user_id: entry.user_id,
            item: self.item(entry.item_id).await?,
            rating: entry.rating,
            review: entry.review,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn add_saved(
        &self,
        list: SavedList,
        user_id: Uuid,
        item_id: i64,
    ) -> CatalogResult<SavedItem> {
        let entry = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let now = Utc::now();

            match inner
                .saved
                .iter_mut()
                .find(|e| e.list == list && e.user_id == user_id && e.item_id == item_id)
            {
                Some(existing) => {
                    existing.created_at = now;
                    existing.clone()
                }
                None => {
                    inner.next_id += 1;
                    let entry = SavedEntry {
                        id: inner.next_id,
                        list,
                        user_id,
                        item_id,
                        created_at: now,
                    };
                    inner.saved.push(entry.clone());
                    entry
                }
            }
        };

        self.to_saved(entry).await
    }

    async fn list_saved(&self, list: SavedList, user_id: Uuid) -> CatalogResult<Vec<SavedItem>> {
        let mut entries: Vec<SavedEntry> = {
            let inner = self.inner.lock().await;
            inner
                .saved
                .iter()
                .filter(|e| e.list == list && e.user_id == user_id)
                .cloned()
                .collect()
        };
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let mut saved = Vec::with_capacity(entries.len());
        for entry in entries {
            saved.push(self.to_saved(entry).await?);
        }
        Ok(saved)
    }

    async fn remove_saved(
        &self,
        list: SavedList,
        user_id: Uuid,
        entry_id: i64,
    ) -> CatalogResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.saved.len();
        inner
            .saved
            .retain(|e| !(e.list == list && e.user_id == user_id && e.id == entry_id));
        Ok(inner.saved.len() < before)
    }

    async fn rate(
        &self,
        user_id: Uuid,
        item_id: i64,
        rating: i16,
        review: &str,
    ) -> CatalogResult<Rating> {
        let entry = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let now = Utc::now();

            match inner
                .ratings
                .iter_mut()
                .find(|e| e.user_id == user_id && e.item_id == item_id)
            {
                Some(existing) => {
                    existing.rating = rating;
                    existing.review = review.to_string();
                    existing.updated_at = now;
                    existing.clone()
                }
                None => {
                    inner.next_id += 1;
                    let entry = RatingEntry {
                        id: inner.next_id,
                        user_id,
                        item_id,
                        rating,
                        review: review.to_string(),
                        created_at: now,
                        updated_at: now,
                    };
                    inner.ratings.push(entry.clone());
                    entry
                }
            }
        };

        self.to_rating(entry).await
    }

    async fn get_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<Option<Rating>> {
        let Some(item_id) = self.row_id(tmdb_id).await? else {
            return Ok(None);
        };

        let entry = {
            let inner = self.inner.lock().await;
            inner
                .ratings
                .iter()
                .find(|e| e.user_id == user_id && e.item_id == item_id)
                .cloned()
        };

        match entry {
            Some(entry) => Ok(Some(self.to_rating(entry).await?)),
            None => Ok(None),
        }
    }

    async fn list_ratings(&self, user_id: Uuid) -> CatalogResult<Vec<Rating>> {
        let mut entries: Vec<RatingEntry> = {
            let inner = self.inner.lock().await;
            inner
                .ratings
                .iter()
                .filter(|e| e.user_id == user_id)
                .cloned()
                .collect()
        };
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        let mut ratings = Vec::with_capacity(entries.len());
        for entry in entries {
            ratings.push(self.to_rating(entry).await?);
        }
        Ok(ratings)
    }

    async fn remove_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<bool> {
        let Some(item_id) = self.row_id(tmdb_id).await? else {
            return Ok(false);
        };

        let mut inner = self.inner.lock().await;
        let before = inner.ratings.len();
        inner
            .ratings
            .retain(|e| !(e.user_id == user_id && e.item_id == item_id));
        Ok(inner.ratings.len() < before)
    }

    async fn flags(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<PreferenceFlags> {
        let Some(item_id) = self.row_id(tmdb_id).await? else {
            return Ok(PreferenceFlags::default());
        };

        let inner = self.inner.lock().await;
        let saved_in = |list: SavedList| {
            inner
                .saved
                .iter()
                .any(|e| e.list == list && e.user_id == user_id && e.item_id == item_id)
        };

        Ok(PreferenceFlags {
            is_favorite: saved_in(SavedList::Favorites),
            is_watchlisted: saved_in(SavedList::Watchlist),
            user_rating: inner
                .ratings
                .iter()
                .find(|e| e.user_id == user_id && e.item_id == item_id)
                .map(|e| e.rating),
        })
    }

    async fn counts(&self, user_id: Uuid) -> CatalogResult<PreferenceCounts> {
        let inner = self.inner.lock().await;
        let count = |list: SavedList| {
            inner
                .saved
                .iter()
                .filter(|e| e.list == list && e.user_id == user_id)
                .count() as i64
        };

        Ok(PreferenceCounts {
            favorites_count: count(SavedList::Favorites),
            watchlist_count: count(SavedList::Watchlist),
            ratings_count: inner.ratings.iter().filter(|e| e.user_id == user_id).count() as i64,
        })
    }
}
