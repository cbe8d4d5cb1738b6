//! HTTP client for the TMDB v3 API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ContentProvider, TmdbConfig, mock};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{GenreList, ListingKind, ProviderPage};

enum Credentials {
    Bearer(String),
    ApiKey(String),
    None,
}

/// TMDB API client.
///
/// Listing, search and genre calls fall back to [`mock`] data when the
/// request fails and `mock_fallback` is on. Detail calls always surface
/// their errors.
pub struct TmdbClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
    mock_fallback: bool,
}

impl TmdbClient {
    /// Create a new TMDB client
    pub fn new(config: TmdbConfig) -> CatalogResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CatalogError::ProviderUnavailable(e.to_string()))?;

        // The v4 read token is preferred when both are present
        let credentials = match (config.read_token, config.api_key) {
            (Some(token), _) => Credentials::Bearer(token),
            (None, Some(key)) => Credentials::ApiKey(key),
            (None, None) => {
                warn!("No TMDB credentials configured; every call will use placeholder data");
                Credentials::None
            }
        };

        Ok(Self {
            http,
            base_url: config.base_url,
            credentials,
            mock_fallback: config.mock_fallback,
        })
    }

    /// Whether requests are sent at all
    pub fn is_configured(&self) -> bool {
        !matches!(self.credentials, Credentials::None)
    }

    fn authorize(&self, request: RequestBuilder) -> CatalogResult<RequestBuilder> {
        match &self.credentials {
            Credentials::Bearer(token) => Ok(request.bearer_auth(token)),
            Credentials::ApiKey(key) => Ok(request.query(&[("api_key", key)])),
            Credentials::None => Err(CatalogError::ProviderUnavailable(
                "TMDB credentials are not configured".to_string(),
            )),
        }
    }

    /// GET `endpoint` with `params` and decode the JSON body
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> CatalogResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(endpoint, ?params, "TMDB request");

        let request = self.authorize(self.http.get(&url).query(params))?;
        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::ProviderUnavailable(format!("{}: {}", endpoint, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(format!("TMDB {}", endpoint)));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::ProviderUnavailable(format!(
                "{} returned {}",
                endpoint, status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::ProviderBadResponse(format!(
                "{} returned {}: {}",
                endpoint, status, body
            )));
        }

        response.json::<T>().await.map_err(|e| {
            CatalogError::ProviderBadResponse(format!("Failed to parse {} response: {}", endpoint, e))
        })
    }

    fn or_placeholder<T>(
        &self,
        result: CatalogResult<T>,
        what: &str,
        placeholder: impl FnOnce() -> T,
    ) -> CatalogResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if self.mock_fallback => {
                warn!(error = %e, "TMDB {} failed, serving placeholder data", what);
                Ok(placeholder())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ContentProvider for TmdbClient {
    async fn listing(&self, kind: ListingKind, page: u32) -> CatalogResult<ProviderPage> {
        let mut params: Vec<(&str, String)> = vec![("page", page.to_string())];
        params.extend(
            kind.extra_params()
                .iter()
                .map(|(name, value)| (*name, value.to_string())),
        );

        let result = self.fetch(kind.endpoint(), &params).await;
        self.or_placeholder(result, kind.as_str(), || mock::listing_page(kind, page))
    }

    async fn search(&self, query: &str, page: u32) -> CatalogResult<ProviderPage> {
        let params = [("query", query.to_string()), ("page", page.to_string())];
        let result = self.fetch("/search/multi", &params).await;
        self.or_placeholder(result, "search", || mock::search_page(query, page))
    }

    async fn details(&self, tmdb_id: i64) -> CatalogResult<Value> {
        let params = [(
            "append_to_response",
            "credits,videos,reviews".to_string(),
        )];
        self.fetch(&format!("/movie/{}", tmdb_id), &params).await
    }

    async fn genres(&self) -> CatalogResult<GenreList> {
        let result = self.fetch("/genre/movie/list", &[]).await;
        self.or_placeholder(result, "genres", mock::genres)
    }
}
