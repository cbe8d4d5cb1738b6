//! API models for request and response payloads

use catalog::{ItemDetails, PreferenceCounts, PreferenceFlags};
use serde::{Deserialize, Serialize};

/// `GET /movies` query
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `trending`, `top_rated`, `tv`; anything else lists movies
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<u32>,
}

/// `GET /movies/search` query
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<u32>,
}

/// Body of `POST /movies/favorites` and `POST /movies/watchlist`
#[derive(Debug, Deserialize)]
pub struct SaveItemRequest {
    /// TMDB id of the movie
    pub movie_id: i64,
}

/// Body of `POST|PUT /movies/:tmdb_id/rate`
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i32,
    #[serde(default)]
    pub review: String,
}

/// Detail payload, with the caller's flags when a valid token was sent
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    #[serde(flatten)]
    pub details: ItemDetails,
    #[serde(flatten)]
    pub flags: Option<PreferenceFlags>,
}

/// `GET /users/stats`
#[derive(Debug, Serialize)]
pub struct UserStatsResponse {
    #[serde(flatten)]
    pub counts: PreferenceCounts,
    /// Month and year of registration, e.g. "June 2024"
    pub member_since: String,
}
