//! TMDB (The Movie Database) integration.
//!
//! [`TmdbClient`] talks to the real API; [`mock`] synthesizes deterministic
//! pages used when TMDB is unreachable or unconfigured.

mod client;
pub mod mock;

pub use client::TmdbClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CatalogResult;
use crate::models::{GenreList, ListingKind, ProviderPage};

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
const PLACEHOLDER_KEY: &str = "your-tmdb-api-key-here";

/// TMDB client configuration
#[derive(Debug, Clone)]
pub struct TmdbConfig {
    /// v3 API key, sent as the `api_key` query parameter
    pub api_key: Option<String>,
    /// v4 read access token, sent as a bearer token (preferred)
    pub read_token: Option<String>,
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Serve generated pages instead of errors on listing/search/genre failures
    pub mock_fallback: bool,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            read_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 10,
            mock_fallback: true,
        }
    }
}

impl TmdbConfig {
    /// Create a new TmdbConfig from environment variables
    ///
    /// # Environment Variables
    /// - `TMDB_API_KEY`: v3 API key
    /// - `TMDB_READ_TOKEN`: v4 read access token
    /// - `TMDB_BASE_URL`: API root (default: "https://api.themoviedb.org/3")
    /// - `TMDB_TIMEOUT_SECONDS`: per-request timeout (default: 10)
    /// - `TMDB_MOCK_FALLBACK`: `false` to surface provider errors (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_key: credential("TMDB_API_KEY"),
            read_token: credential("TMDB_READ_TOKEN"),
            base_url: std::env::var("TMDB_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout_seconds: std::env::var("TMDB_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            mock_fallback: std::env::var("TMDB_MOCK_FALLBACK")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(defaults.mock_fallback),
        }
    }

    /// Whether any credential is available
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.read_token.is_some()
    }
}

// Unset, blank and the sample value from `.env.example` all count as absent
fn credential(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != PLACEHOLDER_KEY)
}

/// Source of catalog pages, details and genres
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// One page of a listing
    async fn listing(&self, kind: ListingKind, page: u32) -> CatalogResult<ProviderPage>;

    /// One page of `/search/multi` results
    async fn search(&self, query: &str, page: u32) -> CatalogResult<ProviderPage>;

    /// Raw detail payload with credits, videos and reviews appended
    async fn details(&self, tmdb_id: i64) -> CatalogResult<Value>;

    /// Movie genre table
    async fn genres(&self) -> CatalogResult<GenreList>;
}
