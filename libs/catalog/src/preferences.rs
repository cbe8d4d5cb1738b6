//! Favorites, watchlist and ratings

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::cache::{
    CacheClass, MovieCache, user_favorites_key, user_ratings_key, user_stats_key,
    user_watchlist_key,
};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    MAX_RATING, MIN_RATING, PreferenceCounts, PreferenceFlags, Rating, SavedItem, SavedList,
};
use crate::store::{CatalogStore, item_columns, item_from_row};

/// Persistence of per-user preferences.
///
/// Items are referenced by their catalog row id; lookups by TMDB id go
/// through the catalog join.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Save an item; saving it again only refreshes `created_at`
    async fn add_saved(&self, list: SavedList, user_id: Uuid, item_id: i64)
    -> CatalogResult<SavedItem>;

    /// Newest first
    async fn list_saved(&self, list: SavedList, user_id: Uuid) -> CatalogResult<Vec<SavedItem>>;

    /// Delete one entry owned by `user_id`; false when there was none
    async fn remove_saved(&self, list: SavedList, user_id: Uuid, entry_id: i64)
    -> CatalogResult<bool>;

    /// Create or overwrite the user's rating of an item
    async fn rate(&self, user_id: Uuid, item_id: i64, rating: i16, review: &str)
    -> CatalogResult<Rating>;

    async fn get_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<Option<Rating>>;

    /// Most recently updated first
    async fn list_ratings(&self, user_id: Uuid) -> CatalogResult<Vec<Rating>>;

    async fn remove_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<bool>;

    async fn flags(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<PreferenceFlags>;

    async fn counts(&self, user_id: Uuid) -> CatalogResult<PreferenceCounts>;
}

fn saved_from_row(row: &PgRow) -> SavedItem {
    SavedItem {
        id: row.get("saved_id"),
        user_id: row.get("saved_user_id"),
        item: item_from_row(row),
        created_at: row.get("saved_at"),
    }
}

fn rating_from_row(row: &PgRow) -> Rating {
    Rating {
        id: row.get("rating_id"),
        user_id: row.get("rating_user_id"),
        item: item_from_row(row),
        rating: row.get("rating"),
        review: row.get("review"),
        created_at: row.get("rated_at"),
        updated_at: row.get("rating_updated_at"),
    }
}

const RATING_COLUMNS: &str = "r.id AS rating_id, r.user_id AS rating_user_id, r.rating, r.review, \
     r.created_at AS rated_at, r.updated_at AS rating_updated_at";

/// PostgreSQL preference store
#[derive(Clone)]
pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    /// Create a new preference store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn add_saved(
        &self,
        list: SavedList,
        user_id: Uuid,
        item_id: i64,
    ) -> CatalogResult<SavedItem> {
        let row = sqlx::query(&format!(
            r#"
            WITH saved AS (
                INSERT INTO {table} (user_id, item_id)
                VALUES ($1, $2)
                ON CONFLICT (user_id, item_id) DO UPDATE SET created_at = NOW()
                RETURNING id, user_id, item_id, created_at
            )
            SELECT saved.id AS saved_id, saved.user_id AS saved_user_id,
                   saved.created_at AS saved_at, {columns}
            FROM saved
            JOIN catalog_items c ON c.id = saved.item_id
            "#,
            table = list.table(),
            columns = item_columns("c"),
        ))
        .bind(user_id)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved_from_row(&row))
    }

    async fn list_saved(&self, list: SavedList, user_id: Uuid) -> CatalogResult<Vec<SavedItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT s.id AS saved_id, s.user_id AS saved_user_id,
                   s.created_at AS saved_at, {columns}
            FROM {table} s
            JOIN catalog_items c ON c.id = s.item_id
            WHERE s.user_id = $1
            ORDER BY s.created_at DESC, s.id DESC
            "#,
            table = list.table(),
            columns = item_columns("c"),
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(saved_from_row).collect())
    }

    async fn remove_saved(
        &self,
        list: SavedList,
        user_id: Uuid,
        entry_id: i64,
    ) -> CatalogResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = $1 AND user_id = $2",
            list.table()
        ))
        .bind(entry_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rate(
        &self,
        user_id: Uuid,
        item_id: i64,
        rating: i16,
        review: &str,
    ) -> CatalogResult<Rating> {
        let row = sqlx::query(&format!(
            r#"
            WITH r AS (
                INSERT INTO ratings (user_id, item_id, rating, review)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id, item_id) DO UPDATE SET
                    rating = EXCLUDED.rating,
                    review = EXCLUDED.review,
                    updated_at = NOW()
                RETURNING *
            )
            SELECT {ratings}, {columns}
            FROM r
            JOIN catalog_items c ON c.id = r.item_id
            "#,
            ratings = RATING_COLUMNS,
            columns = item_columns("c"),
        ))
        .bind(user_id)
        .bind(item_id)
        .bind(rating)
        .bind(review)
        .fetch_one(&self.pool)
        .await?;

        Ok(rating_from_row(&row))
    }

    async fn get_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<Option<Rating>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {ratings}, {columns}
            FROM ratings r
            JOIN catalog_items c ON c.id = r.item_id
            WHERE r.user_id = $1 AND c.tmdb_id = $2
            "#,
            ratings = RATING_COLUMNS,
            columns = item_columns("c"),
        ))
        .bind(user_id)
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(rating_from_row))
    }

    async fn list_ratings(&self, user_id: Uuid) -> CatalogResult<Vec<Rating>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ratings}, {columns}
            FROM ratings r
            JOIN catalog_items c ON c.id = r.item_id
            WHERE r.user_id = $1
            ORDER BY r.updated_at DESC, r.id DESC
            "#,
            ratings = RATING_COLUMNS,
            columns = item_columns("c"),
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(rating_from_row).collect())
    }

    async fn remove_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM ratings r
            USING catalog_items c
            WHERE r.item_id = c.id AND r.user_id = $1 AND c.tmdb_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tmdb_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn flags(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<PreferenceFlags> {
        let row = sqlx::query(
            r#"
            SELECT
                EXISTS (
                    SELECT 1 FROM favorites f JOIN catalog_items c ON c.id = f.item_id
                    WHERE f.user_id = $1 AND c.tmdb_id = $2
                ) AS is_favorite,
                EXISTS (
                    SELECT 1 FROM watchlist w JOIN catalog_items c ON c.id = w.item_id
                    WHERE w.user_id = $1 AND c.tmdb_id = $2
                ) AS is_watchlisted,
                (
                    SELECT r.rating FROM ratings r JOIN catalog_items c ON c.id = r.item_id
                    WHERE r.user_id = $1 AND c.tmdb_id = $2
                ) AS user_rating
            "#,
        )
        .bind(user_id)
        .bind(tmdb_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PreferenceFlags {
            is_favorite: row.get("is_favorite"),
            is_watchlisted: row.get("is_watchlisted"),
            user_rating: row.get("user_rating"),
        })
    }

    async fn counts(&self, user_id: Uuid) -> CatalogResult<PreferenceCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM favorites WHERE user_id = $1) AS favorites_count,
                (SELECT COUNT(*) FROM watchlist WHERE user_id = $1) AS watchlist_count,
                (SELECT COUNT(*) FROM ratings WHERE user_id = $1) AS ratings_count
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PreferenceCounts {
            favorites_count: row.get("favorites_count"),
            watchlist_count: row.get("watchlist_count"),
            ratings_count: row.get("ratings_count"),
        })
    }
}

/// Validated, cache-aware access to user preferences.
///
/// Every write invalidates the user's cached reads before returning.
#[derive(Clone)]
pub struct PreferenceService {
    store: Arc<dyn PreferenceStore>,
    catalog: Arc<dyn CatalogStore>,
    cache: MovieCache,
}

impl PreferenceService {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        catalog: Arc<dyn CatalogStore>,
        cache: MovieCache,
    ) -> Self {
        Self {
            store,
            catalog,
            cache,
        }
    }

    fn validate_item(tmdb_id: i64) -> CatalogResult<()> {
        if tmdb_id <= 0 {
            return Err(CatalogError::InvalidItem(tmdb_id));
        }
        Ok(())
    }

    fn validate_rating(rating: i32) -> CatalogResult<i16> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(CatalogError::InvalidRating(rating));
        }
        Ok(rating as i16)
    }

    fn list_key(list: SavedList, user_id: Uuid) -> String {
        match list {
            SavedList::Favorites => user_favorites_key(user_id),
            SavedList::Watchlist => user_watchlist_key(user_id),
        }
    }

    /// Save `tmdb_id` to one of the user's lists, creating a placeholder item if needed
    pub async fn add(&self, list: SavedList, user_id: Uuid, tmdb_id: i64) -> CatalogResult<SavedItem> {
        Self::validate_item(tmdb_id)?;

        let item = self.catalog.ensure_placeholder(tmdb_id).await?;
        let item_id = item
            .id
            .ok_or_else(|| CatalogError::Storage(format!("item {} has no row id", tmdb_id)))?;

        let saved = self.store.add_saved(list, user_id, item_id).await?;
        self.cache.invalidate_user(user_id).await;

        info!(%user_id, tmdb_id, list = list.table(), "Item saved");
        Ok(saved)
    }

    pub async fn list(&self, list: SavedList, user_id: Uuid) -> CatalogResult<Vec<SavedItem>> {
        let key = Self::list_key(list, user_id);
        if let Some(cached) = self.cache.get_json::<Vec<SavedItem>>(&key).await {
            return Ok(cached);
        }

        let entries = self.store.list_saved(list, user_id).await?;
        self.cache.set_json(&key, &entries, CacheClass::User).await;
        Ok(entries)
    }

    /// Remove an entry by its own id; `NotFound` unless the user owns it
    pub async fn remove(&self, list: SavedList, user_id: Uuid, entry_id: i64) -> CatalogResult<()> {
        if !self.store.remove_saved(list, user_id, entry_id).await? {
            return Err(CatalogError::NotFound(format!(
                "{} entry {}",
                list.table(),
                entry_id
            )));
        }

        self.cache.invalidate_user(user_id).await;
        info!(%user_id, entry_id, list = list.table(), "Item removed");
        Ok(())
    }

    pub async fn add_favorite(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<SavedItem> {
        self.add(SavedList::Favorites, user_id, tmdb_id).await
    }

    pub async fn list_favorites(&self, user_id: Uuid) -> CatalogResult<Vec<SavedItem>> {
        self.list(SavedList::Favorites, user_id).await
    }

    pub async fn remove_favorite(&self, user_id: Uuid, favorite_id: i64) -> CatalogResult<()> {
        self.remove(SavedList::Favorites, user_id, favorite_id).await
    }

    pub async fn add_to_watchlist(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<SavedItem> {
        self.add(SavedList::Watchlist, user_id, tmdb_id).await
    }

    pub async fn list_watchlist(&self, user_id: Uuid) -> CatalogResult<Vec<SavedItem>> {
        self.list(SavedList::Watchlist, user_id).await
    }

    pub async fn remove_from_watchlist(&self, user_id: Uuid, entry_id: i64) -> CatalogResult<()> {
        self.remove(SavedList::Watchlist, user_id, entry_id).await
    }

    /// Create or update a rating; the value is checked before anything is written
    pub async fn rate(
        &self,
        user_id: Uuid,
        tmdb_id: i64,
        rating: i32,
        review: &str,
    ) -> CatalogResult<Rating> {
        let rating = Self::validate_rating(rating)?;
        Self::validate_item(tmdb_id)?;

        let item = self.catalog.ensure_placeholder(tmdb_id).await?;
        let item_id = item
            .id
            .ok_or_else(|| CatalogError::Storage(format!("item {} has no row id", tmdb_id)))?;

        let saved = self.store.rate(user_id, item_id, rating, review.trim()).await?;
        self.cache.invalidate_user(user_id).await;
        self.cache.invalidate_item(tmdb_id).await;

        info!(%user_id, tmdb_id, rating, "Item rated");
        Ok(saved)
    }

    pub async fn get_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<Option<Rating>> {
        self.store.get_rating(user_id, tmdb_id).await
    }

    pub async fn list_ratings(&self, user_id: Uuid) -> CatalogResult<Vec<Rating>> {
        let key = user_ratings_key(user_id);
        if let Some(cached) = self.cache.get_json::<Vec<Rating>>(&key).await {
            return Ok(cached);
        }

        let ratings = self.store.list_ratings(user_id).await?;
        self.cache.set_json(&key, &ratings, CacheClass::User).await;
        Ok(ratings)
    }

    pub async fn remove_rating(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<()> {
        if !self.store.remove_rating(user_id, tmdb_id).await? {
            return Err(CatalogError::NotFound(format!("rating for {}", tmdb_id)));
        }

        self.cache.invalidate_user(user_id).await;
        self.cache.invalidate_item(tmdb_id).await;
        Ok(())
    }

    pub async fn flags(&self, user_id: Uuid, tmdb_id: i64) -> CatalogResult<PreferenceFlags> {
        self.store.flags(user_id, tmdb_id).await
    }

    pub async fn stats(&self, user_id: Uuid) -> CatalogResult<PreferenceCounts> {
        let key = user_stats_key(user_id);
        if let Some(cached) = self.cache.get_json::<PreferenceCounts>(&key).await {
            return Ok(cached);
        }

        let counts = self.store.counts(user_id).await?;
        self.cache.set_json(&key, &counts, CacheClass::User).await;
        Ok(counts)
    }
}
