//! Response cache in front of TMDB and the per-user preference reads

use std::sync::Arc;

use common::cache::CacheStore;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use uuid::Uuid;

const KEY_PREFIX: &str = "movie_api";
const MAX_PARAMS_LEN: usize = 50;

/// Lifetime class of a cached payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheClass {
    /// Listing pages, 1 hour
    Listing,
    /// Search pages, 30 minutes
    Search,
    /// Item details, 24 hours
    Detail,
    /// Genre table, 24 hours
    Genres,
    /// Per-user preference reads, 5 minutes
    User,
}

impl CacheClass {
    pub fn ttl_seconds(&self) -> u64 {
        match self {
            CacheClass::Listing => 3600,
            CacheClass::Search => 1800,
            CacheClass::Detail | CacheClass::Genres => 86_400,
            CacheClass::User => 300,
        }
    }
}

/// Build `movie_api_{namespace}_{params}`.
///
/// Parameters are sorted by name and joined as `k_v`; a joined string longer
/// than 50 characters is replaced by its md5 digest.
pub fn cache_key(namespace: &str, params: &[(&str, String)]) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort();

    let joined = sorted
        .iter()
        .map(|(name, value)| format!("{}_{}", name, value))
        .collect::<Vec<_>>()
        .join("_");

    let joined = if joined.len() > MAX_PARAMS_LEN {
        format!("{:x}", md5::compute(joined.as_bytes()))
    } else {
        joined
    };

    format!("{}_{}_{}", KEY_PREFIX, namespace, joined)
}

/// Key holding the cached detail payload of one item
pub fn detail_key(tmdb_id: i64) -> String {
    cache_key("movie_details", &[("tmdb_id", tmdb_id.to_string())])
}

/// Per-user keys
pub fn user_favorites_key(user_id: Uuid) -> String {
    format!("user_favorites_{}", user_id)
}

pub fn user_watchlist_key(user_id: Uuid) -> String {
    format!("user_watchlist_{}", user_id)
}

pub fn user_ratings_key(user_id: Uuid) -> String {
    format!("user_ratings_{}", user_id)
}

pub fn user_stats_key(user_id: Uuid) -> String {
    format!("user_stats_{}", user_id)
}

pub fn item_ratings_key(tmdb_id: i64) -> String {
    format!("movie_ratings_{}", tmdb_id)
}

/// JSON cache over a [`CacheStore`].
///
/// Backend failures never reach the caller: reads degrade to a miss and
/// writes are skipped, both with a warning.
#[derive(Clone)]
pub struct MovieCache {
    store: Arc<dyn CacheStore>,
}

impl MovieCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, class: CacheClass) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "cache payload not serializable, skipping write");
                return;
            }
        };

        if let Err(e) = self
            .store
            .set(key, &raw, Some(class.ttl_seconds()))
            .await
        {
            warn!(key, error = %e, "cache write failed");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "cache delete failed");
        }
    }

    /// Drop every cached preference read of one user
    pub async fn invalidate_user(&self, user_id: Uuid) {
        for key in [
            user_favorites_key(user_id),
            user_watchlist_key(user_id),
            user_ratings_key(user_id),
            user_stats_key(user_id),
        ] {
            self.delete(&key).await;
        }
        debug!(%user_id, "user cache invalidated");
    }

    /// Drop the cached detail and ratings of one item
    pub async fn invalidate_item(&self, tmdb_id: i64) {
        self.delete(&detail_key(tmdb_id)).await;
        self.delete(&item_ratings_key(tmdb_id)).await;
        debug!(tmdb_id, "item cache invalidated");
    }
}
