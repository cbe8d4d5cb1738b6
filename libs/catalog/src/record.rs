//! Normalisation of raw TMDB result objects into catalog records

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::models::{CatalogItem, ExtendedAttributes, MediaKind};

/// Why a raw TMDB object cannot become a catalog record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has no numeric id")]
    MissingId,

    #[error("record {0} has no title")]
    MissingTitle(i64),

    #[error("record {0} is a {1}, not a movie or tv show")]
    NotCatalogItem(i64, String),
}

/// A TMDB movie or show, validated and ready to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
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
    /// Present only when built from a detail payload
    pub extended: Option<ExtendedAttributes>,
}

impl CatalogRecord {
    /// Build a record from a list/search result object
    pub fn from_raw(raw: &Value) -> Result<Self, RecordError> {
        Self::from_raw_as(raw, None)
    }

    /// Like [`from_raw`](Self::from_raw), with the kind to assume when the
    /// object carries no `media_type` (e.g. `/discover/tv` results)
    pub fn from_raw_as(raw: &Value, default_kind: Option<MediaKind>) -> Result<Self, RecordError> {
        let tmdb_id = raw
            .get("id")
            .and_then(Value::as_i64)
            .ok_or(RecordError::MissingId)?;

        let media_type = match raw.get("media_type").and_then(Value::as_str) {
            Some(kind) => MediaKind::parse(kind)
                .ok_or_else(|| RecordError::NotCatalogItem(tmdb_id, kind.to_string()))?,
            None => match default_kind {
                Some(kind) => kind,
                None if raw.get("first_air_date").is_some() => MediaKind::Tv,
                None => MediaKind::Movie,
            },
        };

        let title = string_field(raw, "title")
            .or_else(|| string_field(raw, "name"))
            .ok_or(RecordError::MissingTitle(tmdb_id))?;

        let release_date = string_field(raw, "release_date")
            .or_else(|| string_field(raw, "first_air_date"))
            .and_then(|s| parse_date(&s));

        Ok(Self {
            tmdb_id,
            title,
            overview: string_field(raw, "overview").unwrap_or_default(),
            poster_path: string_field(raw, "poster_path"),
            backdrop_path: string_field(raw, "backdrop_path"),
            release_date,
            vote_average: raw.get("vote_average").and_then(Value::as_f64).unwrap_or(0.0),
            vote_count: raw.get("vote_count").and_then(Value::as_i64).unwrap_or(0),
            popularity: raw.get("popularity").and_then(Value::as_f64).unwrap_or(0.0),
            genre_ids: genre_ids(raw),
            media_type,
            extended: None,
        })
    }

    /// Build a record from a `/movie/{id}` detail payload
    pub fn from_details(raw: &Value) -> Result<Self, RecordError> {
        let mut record = Self::from_raw(raw)?;
        record.extended = Some(ExtendedAttributes {
            tagline: string_field(raw, "tagline"),
            imdb_id: string_field(raw, "imdb_id"),
            original_language: string_field(raw, "original_language"),
            budget: raw.get("budget").and_then(Value::as_i64),
            revenue: raw.get("revenue").and_then(Value::as_i64),
            runtime: raw
                .get("runtime")
                .and_then(Value::as_i64)
                .and_then(|r| i32::try_from(r).ok()),
            status: string_field(raw, "status"),
            production_companies: non_null(raw, "production_companies"),
            production_countries: non_null(raw, "production_countries"),
            spoken_languages: non_null(raw, "spoken_languages"),
        });
        Ok(record)
    }

    /// Unpersisted item for immediate display
    pub fn to_transient(&self) -> CatalogItem {
        CatalogItem {
            id: None,
            tmdb_id: self.tmdb_id,
            title: self.title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            release_date: self.release_date,
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            genre_ids: self.genre_ids.clone(),
            media_type: self.media_type,
            extended: self.extended.clone().unwrap_or_default(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// `YYYY-MM-DD`; anything else is treated as unknown
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_null(raw: &Value, key: &str) -> Option<Value> {
    raw.get(key).filter(|v| !v.is_null()).cloned()
}

// List results carry `genre_ids`, detail payloads carry `genres: [{id, name}]`
fn genre_ids(raw: &Value) -> Vec<i64> {
    if let Some(ids) = raw.get("genre_ids").and_then(Value::as_array) {
        return ids.iter().filter_map(Value::as_i64).collect();
    }

    raw.get("genres")
        .and_then(Value::as_array)
        .map(|genres| {
            genres
                .iter()
                .filter_map(|g| g.get("id").and_then(Value::as_i64))
                .collect()
        })
        .unwrap_or_default()
}
