//! Catalog and preference models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Movie or TV show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Movie,
    Tv,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(MediaKind::Movie),
            "tv" => Some(MediaKind::Tv),
            _ => None,
        }
    }
}

/// Which TMDB listing a list request maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Trending,
    TopRated,
    Tv,
    #[default]
    Movie,
}

impl ListingKind {
    /// Parse the `type` query parameter; anything unknown is the generic movie listing
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "trending" => ListingKind::Trending,
            "top_rated" | "top-rated" => ListingKind::TopRated,
            "tv" => ListingKind::Tv,
            _ => ListingKind::Movie,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Trending => "trending",
            ListingKind::TopRated => "top_rated",
            ListingKind::Tv => "tv",
            ListingKind::Movie => "movie",
        }
    }

    /// TMDB endpoint path for this listing
    pub fn endpoint(&self) -> &'static str {
        match self {
            ListingKind::Trending => "/trending/all/week",
            ListingKind::TopRated => "/movie/top_rated",
            ListingKind::Tv => "/discover/tv",
            ListingKind::Movie => "/discover/movie",
        }
    }

    /// Extra query parameters besides `page`
    pub fn extra_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ListingKind::Tv | ListingKind::Movie => &[("sort_by", "popularity.desc")],
            ListingKind::Trending | ListingKind::TopRated => &[],
        }
    }

    /// Media kind of results when TMDB leaves `media_type` out
    pub fn default_media_kind(&self) -> Option<MediaKind> {
        match self {
            ListingKind::Tv => Some(MediaKind::Tv),
            ListingKind::TopRated | ListingKind::Movie => Some(MediaKind::Movie),
            ListingKind::Trending => None,
        }
    }
}

/// Attributes only present on detail fetches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedAttributes {
    pub tagline: Option<String>,
    pub imdb_id: Option<String>,
    pub original_language: Option<String>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub runtime: Option<i32>,
    pub status: Option<String>,
    pub production_companies: Option<Value>,
    pub production_countries: Option<Value>,
    pub spoken_languages: Option<Value>,
}

impl ExtendedAttributes {
    pub fn is_empty(&self) -> bool {
        *self == ExtendedAttributes::default()
    }
}

/// One movie or TV show, either stored (`id` set) or transient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Option<i64>,
    pub tmdb_id: i64,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub vote_average: f64,
    pub vote_count: i64,
    pub popularity: f64,
    pub genre_ids: Vec<i64>,
    pub media_type: MediaKind,
    #[serde(flatten)]
    pub extended: ExtendedAttributes,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CatalogItem {
    /// Whether the item has a row in the catalog store
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Stand-in row used when a user saves an item we have never synced
    pub fn placeholder(tmdb_id: i64) -> Self {
        Self {
            id: None,
            tmdb_id,
            title: format!("Movie {}", tmdb_id),
            overview: String::new(),
            poster_path: None,
            backdrop_path: None,
            release_date: None,
            vote_average: 0.0,
            vote_count: 0,
            popularity: 0.0,
            genre_ids: Vec::new(),
            media_type: MediaKind::Movie,
            extended: ExtendedAttributes::default(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// One page of TMDB results in its wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPage {
    #[serde(default = "first_page")]
    pub page: u32,
    pub results: Vec<Value>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
    /// Set on generated pages; those are never cached or synced
    #[serde(skip)]
    pub placeholder: bool,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreList {
    pub genres: Vec<Genre>,
    #[serde(skip)]
    pub placeholder: bool,
}

/// How a list or search request ended; serialized as the response `source`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOutcome {
    /// Answered from TMDB (possibly cached or generated)
    #[serde(rename = "tmdb")]
    Returned,
    /// TMDB path failed; answered from the local store
    #[serde(rename = "local")]
    FailedFallback,
}

/// Response of list and search requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub results: Vec<CatalogItem>,
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
    pub total_results: Option<u32>,
    #[serde(rename = "source")]
    pub outcome: QueryOutcome,
}

impl CatalogPage {
    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            page: None,
            total_pages: None,
            total_results: None,
            outcome: QueryOutcome::Returned,
        }
    }
}

/// Detail response: the item plus pass-through TMDB sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub credits: Option<Value>,
    pub videos: Option<Value>,
    pub reviews: Option<Value>,
}

impl ItemDetails {
    /// Details answered from the store alone
    pub fn local(item: CatalogItem) -> Self {
        Self {
            item,
            credits: None,
            videos: None,
            reviews: None,
        }
    }
}

/// Per-user saved lists sharing one shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavedList {
    Favorites,
    Watchlist,
}

impl SavedList {
    pub fn table(&self) -> &'static str {
        match self {
            SavedList::Favorites => "favorites",
            SavedList::Watchlist => "watchlist",
        }
    }
}

/// A favorite or watchlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItem {
    pub id: i64,
    pub user_id: Uuid,
    #[serde(rename = "movie")]
    pub item: CatalogItem,
    pub created_at: DateTime<Utc>,
}

/// A user's rating of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub user_id: Uuid,
    #[serde(rename = "movie")]
    pub item: CatalogItem,
    pub rating: i16,
    pub review: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lowest accepted rating value
pub const MIN_RATING: i32 = 1;
/// Highest accepted rating value
pub const MAX_RATING: i32 = 5;

/// Per-user markers shown on detail responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceFlags {
    pub is_favorite: bool,
    pub is_watchlisted: bool,
    pub user_rating: Option<i16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceCounts {
    pub favorites_count: i64,
    pub watchlist_count: i64,
    pub ratings_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_kind_parse() {
        assert_eq!(ListingKind::parse("trending"), ListingKind::Trending);
        assert_eq!(ListingKind::parse("TOP_RATED"), ListingKind::TopRated);
        assert_eq!(ListingKind::parse("top-rated"), ListingKind::TopRated);
        assert_eq!(ListingKind::parse("tv"), ListingKind::Tv);
        assert_eq!(ListingKind::parse("movie"), ListingKind::Movie);
        assert_eq!(ListingKind::parse("anything"), ListingKind::Movie);
    }

    #[test]
    fn test_provider_page_defaults() {
        let page: ProviderPage = serde_json::from_value(serde_json::json!({
            "results": []
        }))
        .unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(!page.placeholder);
    }

    #[test]
    fn test_item_serializes_flat_extended_fields() {
        let mut item = CatalogItem::placeholder(550);
        item.extended.runtime = Some(139);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["title"], "Movie 550");
        assert_eq!(json["runtime"], 139);
        assert_eq!(json["media_type"], "movie");
    }

    #[test]
    fn test_fallback_page_reports_local_source() {
        let mut page = CatalogPage::empty();
        page.outcome = QueryOutcome::FailedFallback;
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["source"], "local");
        assert!(json["page"].is_null());
    }
}
