//! Mock content provider for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::fixtures;
use crate::error::{CatalogError, CatalogResult};
use crate::models::{GenreList, ListingKind, ProviderPage};
use crate::tmdb::{ContentProvider, mock};

#[derive(Debug, Default)]
struct Calls {
    listing: usize,
    search: usize,
    details: usize,
    genres: usize,
}

/// Mock implementation of the ContentProvider trait.
///
/// Behaves like a reachable TMDB with mock fallback enabled:
/// - configured listings, search results and details are returned as set
/// - unset listings and searches answer with generated placeholder pages
/// - unset details are `NotFound`
///
/// After [`fail_with_unavailable`](Self::fail_with_unavailable) every call
/// fails, as a client with fallback disabled would.
#[derive(Debug, Default)]
pub struct MockProvider {
    listings: Arc<RwLock<HashMap<ListingKind, ProviderPage>>>,
    search_results: Arc<RwLock<Option<ProviderPage>>>,
    details: Arc<RwLock<HashMap<i64, Value>>>,
    unavailable: Arc<RwLock<bool>>,
    calls: Arc<RwLock<Calls>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_listing(&self, kind: ListingKind, page: ProviderPage) {
        self.listings.write().await.insert(kind, page);
    }

    pub async fn set_search_results(&self, page: ProviderPage) {
        *self.search_results.write().await = Some(page);
    }

    pub async fn set_details(&self, tmdb_id: i64, details: Value) {
        self.details.write().await.insert(tmdb_id, details);
    }

    /// Make every following call fail with `ProviderUnavailable`
    pub async fn fail_with_unavailable(&self) {
        *self.unavailable.write().await = true;
    }

    pub async fn listing_calls(&self) -> usize {
        self.calls.read().await.listing
    }

    pub async fn search_calls(&self) -> usize {
        self.calls.read().await.search
    }

    pub async fn detail_calls(&self) -> usize {
        self.calls.read().await.details
    }

    pub async fn genre_calls(&self) -> usize {
        self.calls.read().await.genres
    }

    async fn check_available(&self) -> CatalogResult<()> {
        if *self.unavailable.read().await {
            return Err(CatalogError::ProviderUnavailable(
                "mock provider is down".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentProvider for MockProvider {
    async fn listing(&self, kind: ListingKind, page: u32) -> CatalogResult<ProviderPage> {
        self.calls.write().await.listing += 1;
        self.check_available().await?;

        match self.listings.read().await.get(&kind) {
            Some(configured) => Ok(configured.clone()),
            None => Ok(mock::listing_page(kind, page)),
        }
    }

    async fn search(&self, query: &str, page: u32) -> CatalogResult<ProviderPage> {
        self.calls.write().await.search += 1;
        self.check_available().await?;

        match self.search_results.read().await.as_ref() {
            Some(configured) => Ok(configured.clone()),
            None => Ok(mock::search_page(query, page)),
        }
    }

    async fn details(&self, tmdb_id: i64) -> CatalogResult<Value> {
        self.calls.write().await.details += 1;
        self.check_available().await?;

        self.details
            .read()
            .await
            .get(&tmdb_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("TMDB /movie/{}", tmdb_id)))
    }

    async fn genres(&self) -> CatalogResult<GenreList> {
        self.calls.write().await.genres += 1;
        self.check_available().await?;
        Ok(fixtures::genre_list())
    }
}
