//! Catalog reads: listings, search, details and genres.
//!
//! Listing and search go cache, then TMDB, then the local store. Whatever
//! TMDB returns is handed to the sync queue so the store catches up in the
//! background.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheClass, MovieCache, cache_key, detail_key};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{
    CatalogItem, CatalogPage, GenreList, ItemDetails, ListingKind, MediaKind, ProviderPage,
    QueryOutcome,
};
use crate::record::CatalogRecord;
use crate::store::CatalogStore;
use crate::sync::{CatalogSync, SyncBatch, SyncHandle};
use crate::tmdb::ContentProvider;

/// Rows served when TMDB cannot answer
pub const FALLBACK_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct CatalogQueryService {
    provider: Arc<dyn ContentProvider>,
    store: Arc<dyn CatalogStore>,
    cache: MovieCache,
    sync: CatalogSync,
    queue: SyncHandle,
}

impl CatalogQueryService {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        store: Arc<dyn CatalogStore>,
        cache: MovieCache,
        queue: SyncHandle,
    ) -> Self {
        Self {
            provider,
            sync: CatalogSync::new(Arc::clone(&store)),
            store,
            cache,
            queue,
        }
    }

    /// One page of a listing; page defaults to 1
    pub async fn list(&self, kind: ListingKind, page: Option<u32>) -> CatalogResult<CatalogPage> {
        let page = page.unwrap_or(1).max(1);

        match self.fetch_listing(kind, page).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(listing = kind.as_str(), page, error = %e, "Listing failed, serving local catalog");
                let results = self.store.list(FALLBACK_LIMIT).await?;
                Ok(fallback_page(results))
            }
        }
    }

    async fn fetch_listing(&self, kind: ListingKind, page: u32) -> CatalogResult<CatalogPage> {
        let key = cache_key(kind.as_str(), &[("page", page.to_string())]);

        let provider_page = match self.cache.get_json::<ProviderPage>(&key).await {
            Some(cached) => cached,
            None => {
                let fetched = self.provider.listing(kind, page).await?;
                if !fetched.placeholder {
                    self.cache
                        .set_json(&key, &fetched, CacheClass::Listing)
                        .await;
                }
                fetched
            }
        };

        self.present(provider_page, kind.default_media_kind()).await
    }

    /// One page of `/search/multi`; a blank query returns nothing
    pub async fn search(&self, query: &str, page: Option<u32>) -> CatalogResult<CatalogPage> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(CatalogPage::empty());
        }
        let page = page.unwrap_or(1).max(1);

        match self.fetch_search(query, page).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(query, page, error = %e, "Search failed, serving local catalog");
                let results = self.store.search_title(query, FALLBACK_LIMIT).await?;
                Ok(fallback_page(results))
            }
        }
    }

    async fn fetch_search(&self, query: &str, page: u32) -> CatalogResult<CatalogPage> {
        let key = cache_key(
            "search",
            &[("query", query.to_string()), ("page", page.to_string())],
        );

        let provider_page = match self.cache.get_json::<ProviderPage>(&key).await {
            Some(cached) => cached,
            None => {
                let fetched = self.provider.search(query, page).await?;
                if !fetched.placeholder {
                    self.cache.set_json(&key, &fetched, CacheClass::Search).await;
                }
                fetched
            }
        };

        self.present(provider_page, None).await
    }

    /// Turn a TMDB page into display items, in TMDB order, and queue it for sync
    async fn present(
        &self,
        page: ProviderPage,
        default_kind: Option<MediaKind>,
    ) -> CatalogResult<CatalogPage> {
        let records: Vec<CatalogRecord> = page
            .results
            .iter()
            .filter_map(|raw| CatalogRecord::from_raw_as(raw, default_kind).ok())
            .collect();

        let ids: Vec<i64> = records.iter().map(|r| r.tmdb_id).collect();
        let stored = self.store.get_many_by_tmdb_ids(&ids).await?;

        let results: Vec<CatalogItem> = records
            .iter()
            .map(|record| match stored.get(&record.tmdb_id) {
                Some(item) => item.clone(),
                None => record.to_transient(),
            })
            .collect();

        // Generated pages are never written to the store
        if !page.placeholder {
            let raw: Vec<Value> = page
                .results
                .into_iter()
                .filter(|raw| raw.get("media_type").and_then(Value::as_str) != Some("person"))
                .collect();
            if let Err(e) = self.queue.try_submit(SyncBatch::new(raw, default_kind)) {
                warn!(error = %e, "Could not queue page for sync");
            }
        }

        Ok(CatalogPage {
            results,
            page: Some(page.page),
            total_pages: Some(page.total_pages),
            total_results: Some(page.total_results),
            outcome: QueryOutcome::Returned,
        })
    }

    /// Details of one item, synced with extended attributes before returning
    pub async fn detail(&self, tmdb_id: i64) -> CatalogResult<ItemDetails> {
        if tmdb_id <= 0 {
            return Err(CatalogError::InvalidItem(tmdb_id));
        }

        let key = detail_key(tmdb_id);
        let raw = match self.cache.get_json::<Value>(&key).await {
            Some(cached) => Ok(cached),
            None => match self.provider.details(tmdb_id).await {
                Ok(fetched) => {
                    self.cache.set_json(&key, &fetched, CacheClass::Detail).await;
                    Ok(fetched)
                }
                Err(e) => Err(e),
            },
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                debug!(tmdb_id, error = %e, "Details unavailable from TMDB, trying local catalog");
                return match self.store.get_by_tmdb_id(tmdb_id).await? {
                    Some(item) => Ok(ItemDetails::local(item)),
                    None => Err(CatalogError::NotFound(format!("movie {}", tmdb_id))),
                };
            }
        };

        let item = match self.sync.sync_details(&raw).await {
            Ok(Some(item)) => item,
            Ok(None) => return Err(CatalogError::NotFound(format!("movie {}", tmdb_id))),
            Err(e) => {
                warn!(tmdb_id, error = %e, "Detail sync failed, serving unsaved copy");
                CatalogRecord::from_details(&raw)
                    .map(|record| record.to_transient())
                    .map_err(|_| CatalogError::NotFound(format!("movie {}", tmdb_id)))?
            }
        };

        Ok(ItemDetails {
            item,
            credits: section(&raw, "credits"),
            videos: section(&raw, "videos"),
            reviews: section(&raw, "reviews"),
        })
    }

    /// The movie genre table
    pub async fn genres(&self) -> CatalogResult<GenreList> {
        let key = cache_key("genres", &[]);
        if let Some(cached) = self.cache.get_json::<GenreList>(&key).await {
            return Ok(cached);
        }

        let genres = self.provider.genres().await?;
        if !genres.placeholder {
            self.cache.set_json(&key, &genres, CacheClass::Genres).await;
        }
        Ok(genres)
    }
}

fn section(raw: &Value, name: &str) -> Option<Value> {
    raw.get(name).filter(|v| !v.is_null()).cloned()
}

fn fallback_page(results: Vec<CatalogItem>) -> CatalogPage {
    CatalogPage {
        results,
        page: None,
        total_pages: None,
        total_results: None,
        outcome: QueryOutcome::FailedFallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SyncConfig, SyncQueue};
    use crate::testing::{MemoryCatalogStore, MockProvider, fixtures};
    use common::cache::MemoryCache;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        provider: Arc<MockProvider>,
        store: Arc<MemoryCatalogStore>,
        memory: MemoryCache,
        queue: SyncQueue,
        service: CatalogQueryService,
    }

    fn harness() -> Harness {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryCatalogStore::new());
        let memory = MemoryCache::new();
        let queue = SyncQueue::start(
            CatalogSync::new(store.clone()),
            &SyncConfig {
                backoff_base: Duration::from_millis(1),
                ..SyncConfig::default()
            },
        );
        let service = CatalogQueryService::new(
            provider.clone(),
            store.clone(),
            MovieCache::new(Arc::new(memory.clone())),
            queue.handle(),
        );

        Harness {
            provider,
            store,
            memory,
            queue,
            service,
        }
    }

    impl Harness {
        async fn drain(self) -> Arc<MemoryCatalogStore> {
            let Harness {
                store,
                queue,
                service,
                ..
            } = self;
            drop(service);
            queue.shutdown().await;
            store
        }
    }

    #[tokio::test]
    async fn test_list_preserves_provider_order() {
        let h = harness();
        let page = fixtures::provider_page(1, &[(603, "The Matrix"), (550, "Fight Club"), (13, "Forrest Gump")]);
        h.provider.set_listing(ListingKind::Trending, page).await;

        let result = h.service.list(ListingKind::Trending, None).await.unwrap();
        assert_eq!(result.outcome, QueryOutcome::Returned);
        assert_eq!(result.page, Some(1));
        let ids: Vec<i64> = result.results.iter().map(|i| i.tmdb_id).collect();
        assert_eq!(ids, vec![603, 550, 13]);

        // Background sync catches up after the response
        let store = h.drain().await;
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_list_substitutes_stored_rows() {
        let h = harness();
        let stored = h.store.seed(fixtures::record(550, "Fight Club")).await;
        let page = fixtures::provider_page(1, &[(603, "The Matrix"), (550, "Fight Club")]);
        h.provider.set_listing(ListingKind::Movie, page).await;

        let result = h.service.list(ListingKind::Movie, Some(1)).await.unwrap();
        assert!(!result.results[0].is_persisted());
        assert_eq!(result.results[1], stored);
    }

    #[tokio::test]
    async fn test_list_is_served_from_cache() {
        let h = harness();
        h.provider
            .set_listing(ListingKind::TopRated, fixtures::provider_page(2, &[(1, "One")]))
            .await;

        h.service.list(ListingKind::TopRated, Some(2)).await.unwrap();
        h.service.list(ListingKind::TopRated, Some(2)).await.unwrap();
        assert_eq!(h.provider.listing_calls().await, 1);
        assert_eq!(h.memory.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_does_not_wait_for_a_full_queue() {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryCatalogStore::new());
        // The single worker parks in a long backoff on its first batch
        store.fail_upserts(550, usize::MAX).await;
        let queue = SyncQueue::start(
            CatalogSync::new(store.clone()),
            &SyncConfig {
                workers: 1,
                queue_capacity: 1,
                max_attempts: 2,
                backoff_base: Duration::from_secs(3600),
            },
        );
        provider
            .set_listing(
                ListingKind::Trending,
                fixtures::provider_page(1, &[(550, "Fight Club")]),
            )
            .await;
        let service = CatalogQueryService::new(
            provider.clone(),
            store.clone(),
            MovieCache::new(Arc::new(MemoryCache::new())),
            queue.handle(),
        );

        for page in 1..=4 {
            let listed = tokio::time::timeout(
                Duration::from_secs(5),
                service.list(ListingKind::Trending, Some(page)),
            )
            .await;
            assert!(listed.is_ok(), "page {} waited on the sync queue", page);
            assert_eq!(listed.unwrap().unwrap().results.len(), 1);
        }

        assert!(queue.stats().dropped_batches >= 2);
    }

    #[tokio::test]
    async fn test_list_drops_people() {
        let h = harness();
        let mut page = fixtures::provider_page(1, &[(1, "One")]);
        page.results.push(json!({"id": 287, "name": "Brad Pitt", "media_type": "person"}));
        h.provider.set_listing(ListingKind::Trending, page).await;

        let result = h.service.list(ListingKind::Trending, None).await.unwrap();
        assert_eq!(result.results.len(), 1);

        let store = h.drain().await;
        assert!(store.get_by_tmdb_id(287).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_placeholder_pages_are_not_cached_or_synced() {
        let h = harness();
        let result = h.service.list(ListingKind::Tv, Some(3)).await.unwrap();
        assert_eq!(result.results.len(), 20);
        assert_eq!(result.total_pages, Some(500));
        assert!(h.memory.is_empty().await);

        let store = h.drain().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_store() {
        let h = harness();
        h.store.seed(fixtures::record(1, "Local One")).await;
        h.store.seed(fixtures::record(2, "Local Two")).await;
        h.provider.fail_with_unavailable().await;

        let result = h.service.list(ListingKind::Trending, None).await.unwrap();
        assert_eq!(result.outcome, QueryOutcome::FailedFallback);
        assert_eq!(result.results.len(), 2);
        assert!(result.page.is_none());

        let result = h.service.search("two", None).await.unwrap();
        assert_eq!(result.outcome, QueryOutcome::FailedFallback);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].title, "Local Two");
    }

    #[tokio::test]
    async fn test_blank_search_skips_provider() {
        let h = harness();
        let result = h.service.search("   ", Some(4)).await.unwrap();
        assert!(result.results.is_empty());
        assert_eq!(h.provider.search_calls().await, 0);
    }

    #[tokio::test]
    async fn test_detail_syncs_extended_attributes() {
        let h = harness();
        h.provider.set_details(550, fixtures::details(550, "Fight Club")).await;

        let details = h.service.detail(550).await.unwrap();
        assert!(details.item.is_persisted());
        assert_eq!(details.item.extended.runtime, Some(139));
        assert!(details.credits.is_some());
        assert!(details.reviews.is_none());

        let stored = h.store.get_by_tmdb_id(550).await.unwrap().unwrap();
        assert_eq!(stored.extended.tagline.as_deref(), Some("Mischief. Mayhem. Soap."));
    }

    #[tokio::test]
    async fn test_detail_unreachable_and_unknown_is_not_found() {
        let h = harness();
        h.provider.fail_with_unavailable().await;

        let result = h.service.detail(550).await;
        assert!(matches!(result, Err(CatalogError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_detail_unreachable_serves_stored_row() {
        let h = harness();
        h.store.seed(fixtures::record(550, "Fight Club")).await;
        h.provider.fail_with_unavailable().await;

        let details = h.service.detail(550).await.unwrap();
        assert_eq!(details.item.title, "Fight Club");
        assert!(details.credits.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_details_create_one_row() {
        let h = harness();
        h.provider.set_details(550, fixtures::details(550, "Fight Club")).await;

        let (a, b) = tokio::join!(h.service.detail(550), h.service.detail(550));
        assert_eq!(a.unwrap().item.id, b.unwrap().item.id);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_detail_id() {
        let h = harness();
        assert!(matches!(
            h.service.detail(0).await,
            Err(CatalogError::InvalidItem(0))
        ));
    }

    #[tokio::test]
    async fn test_genres_cached_once_fetched() {
        let h = harness();
        let first = h.service.genres().await.unwrap();
        let second = h.service.genres().await.unwrap();
        assert_eq!(first.genres, second.genres);
        assert_eq!(h.provider.genre_calls().await, 1);
    }
}
