//! End-to-end flows through the query service, sync queue and preference
//! service, wired with the in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use catalog::testing::{MemoryCatalogStore, MemoryPreferenceStore, MockProvider, fixtures};
use catalog::{
    CatalogError, CatalogQueryService, CatalogStore, CatalogSync, ListingKind, MovieCache,
    PreferenceService, QueryOutcome, SyncConfig, SyncQueue,
};
use common::cache::MemoryCache;
use uuid::Uuid;

struct App {
    provider: Arc<MockProvider>,
    store: Arc<MemoryCatalogStore>,
    queue: SyncQueue,
    catalog: CatalogQueryService,
    preferences: PreferenceService,
}

fn app() -> App {
    let provider = Arc::new(MockProvider::new());
    let store = Arc::new(MemoryCatalogStore::new());
    let cache = MovieCache::new(Arc::new(MemoryCache::new()));
    let queue = SyncQueue::start(
        CatalogSync::new(store.clone()),
        &SyncConfig {
            backoff_base: Duration::from_millis(1),
            ..SyncConfig::default()
        },
    );

    let catalog =
        CatalogQueryService::new(provider.clone(), store.clone(), cache.clone(), queue.handle());
    let preferences = PreferenceService::new(
        Arc::new(MemoryPreferenceStore::new(store.clone())),
        store.clone(),
        cache,
    );

    App {
        provider,
        store,
        queue,
        catalog,
        preferences,
    }
}

#[tokio::test]
async fn test_trending_page_matches_provider_then_syncs() {
    let app = app();
    let movies = [(603, "The Matrix"), (550, "Fight Club"), (680, "Pulp Fiction")];
    app.provider
        .set_listing(ListingKind::Trending, fixtures::provider_page(1, &movies))
        .await;

    let page = app.catalog.list(ListingKind::Trending, Some(1)).await.unwrap();
    assert_eq!(page.outcome, QueryOutcome::Returned);
    assert_eq!(page.results.len(), movies.len());
    for (item, (id, title)) in page.results.iter().zip(movies.iter()) {
        assert_eq!(item.tmdb_id, *id);
        assert_eq!(item.title, *title);
    }

    let App {
        store,
        queue,
        catalog,
        preferences,
        ..
    } = app;
    drop(catalog);
    drop(preferences);
    let stats = queue.shutdown().await;

    assert_eq!(stats.synced, 3);
    for (id, _) in movies {
        assert!(store.get_by_tmdb_id(id).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_detail_of_unknown_item_while_provider_down() {
    let app = app();
    app.provider.fail_with_unavailable().await;

    let result = app.catalog.detail(550).await;
    assert!(matches!(result, Err(CatalogError::NotFound(_))));
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_details_share_one_row() {
    let app = app();
    app.provider
        .set_details(27205, fixtures::details(27205, "Inception"))
        .await;

    let requests = (0..4).map(|_| {
        let catalog = app.catalog.clone();
        tokio::spawn(async move { catalog.detail(27205).await })
    });
    let mut ids = Vec::new();
    for request in requests {
        ids.push(request.await.unwrap().unwrap().item.id);
    }

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn test_placeholder_favorite_filled_in_by_detail() {
    let app = app();
    let user = Uuid::new_v4();

    let saved = app.preferences.add_favorite(user, 550).await.unwrap();
    assert_eq!(saved.item.title, "Movie 550");

    app.provider
        .set_details(550, fixtures::details(550, "Fight Club"))
        .await;
    let details = app.catalog.detail(550).await.unwrap();
    assert_eq!(details.item.id, saved.item.id);
    assert_eq!(details.item.title, "Fight Club");

    let favorites = app.preferences.list_favorites(user).await.unwrap();
    assert_eq!(favorites[0].item.title, "Fight Club");
}

#[tokio::test]
async fn test_outage_serves_previously_synced_items() {
    let app = app();
    app.provider
        .set_listing(
            ListingKind::Movie,
            fixtures::provider_page(1, &[(1, "Alien"), (2, "Aliens")]),
        )
        .await;
    app.catalog.list(ListingKind::Movie, None).await.unwrap();

    let App {
        provider,
        store,
        queue,
        catalog,
        ..
    } = app;
    // Let the background sync land before TMDB goes away
    let handle_stats = queue.handle();
    while handle_stats.stats().batches < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(handle_stats);

    provider.fail_with_unavailable().await;
    let page = catalog.search("alien", None).await.unwrap();
    assert_eq!(page.outcome, QueryOutcome::FailedFallback);
    assert_eq!(page.results.len(), 2);
    assert_eq!(store.len().await, 2);
}
