//! Local catalog store: lookups and dirty-checked upserts of TMDB records

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::CatalogResult;
use crate::models::{CatalogItem, ExtendedAttributes, MediaKind};
use crate::record::CatalogRecord;

/// Float fields closer than this are considered equal
pub const FLOAT_EPSILON: f64 = 1e-6;

/// What an upsert did to the stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Stored row after an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub item: CatalogItem,
    pub outcome: UpsertOutcome,
}

/// Persistence of catalog items keyed by `tmdb_id`
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_by_tmdb_id(&self, tmdb_id: i64) -> CatalogResult<Option<CatalogItem>>;

    /// Rows for whichever of `tmdb_ids` are stored
    async fn get_many_by_tmdb_ids(&self, tmdb_ids: &[i64])
    -> CatalogResult<HashMap<i64, CatalogItem>>;

    /// Insert, or overwrite an existing row when [`is_dirty`] says so
    async fn upsert(&self, record: &CatalogRecord) -> CatalogResult<Upserted>;

    /// Return the row for `tmdb_id`, creating a placeholder if absent
    async fn ensure_placeholder(&self, tmdb_id: i64) -> CatalogResult<CatalogItem>;

    /// Most popular rows first
    async fn list(&self, limit: i64) -> CatalogResult<Vec<CatalogItem>>;

    /// Case-insensitive substring match on title or overview
    async fn search_title(&self, query: &str, limit: i64) -> CatalogResult<Vec<CatalogItem>>;
}

/// Whether `record` carries changes worth writing over `existing`.
///
/// Metrics (rating, vote count, popularity) are compared with
/// [`FLOAT_EPSILON`]. A changed title counts too so placeholder rows get
/// their real name. Extended attributes only count when the record has them.
pub fn is_dirty(existing: &CatalogItem, record: &CatalogRecord) -> bool {
    if (existing.vote_average - record.vote_average).abs() > FLOAT_EPSILON
        || existing.vote_count != record.vote_count
        || (existing.popularity - record.popularity).abs() > FLOAT_EPSILON
        || existing.title != record.title
    {
        return true;
    }

    match &record.extended {
        Some(extended) => merge_extended(&existing.extended, extended) != existing.extended,
        None => false,
    }
}

/// Incoming attributes win; absent incoming values keep what is stored
pub fn merge_extended(
    stored: &ExtendedAttributes,
    incoming: &ExtendedAttributes,
) -> ExtendedAttributes {
    ExtendedAttributes {
        tagline: incoming.tagline.clone().or_else(|| stored.tagline.clone()),
        imdb_id: incoming.imdb_id.clone().or_else(|| stored.imdb_id.clone()),
        original_language: incoming
            .original_language
            .clone()
            .or_else(|| stored.original_language.clone()),
        budget: incoming.budget.or(stored.budget),
        revenue: incoming.revenue.or(stored.revenue),
        runtime: incoming.runtime.or(stored.runtime),
        status: incoming.status.clone().or_else(|| stored.status.clone()),
        production_companies: incoming
            .production_companies
            .clone()
            .or_else(|| stored.production_companies.clone()),
        production_countries: incoming
            .production_countries
            .clone()
            .or_else(|| stored.production_countries.clone()),
        spoken_languages: incoming
            .spoken_languages
            .clone()
            .or_else(|| stored.spoken_languages.clone()),
    }
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern
pub(crate) fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

const ITEM_FIELDS: [&str; 24] = [
    "id",
    "tmdb_id",
    "title",
    "overview",
    "poster_path",
    "backdrop_path",
    "release_date",
    "vote_average",
    "vote_count",
    "popularity",
    "genre_ids",
    "media_type",
    "tagline",
    "imdb_id",
    "original_language",
    "budget",
    "revenue",
    "runtime",
    "status",
    "production_companies",
    "production_countries",
    "spoken_languages",
    "created_at",
    "updated_at",
];

/// Comma-separated item columns, qualified with `alias` when one is given
pub(crate) fn item_columns(alias: &str) -> String {
    ITEM_FIELDS
        .iter()
        .map(|field| {
            if alias.is_empty() {
                field.to_string()
            } else {
                format!("{}.{}", alias, field)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Map a row selected with [`item_columns`]
pub(crate) fn item_from_row(row: &PgRow) -> CatalogItem {
    let genre_ids: Json<Vec<i64>> = row.get("genre_ids");
    let media_type: String = row.get("media_type");

    CatalogItem {
        id: Some(row.get("id")),
        tmdb_id: row.get("tmdb_id"),
        title: row.get("title"),
        overview: row.get("overview"),
        poster_path: row.get("poster_path"),
        backdrop_path: row.get("backdrop_path"),
        release_date: row.get("release_date"),
        vote_average: row.get("vote_average"),
        vote_count: row.get("vote_count"),
        popularity: row.get("popularity"),
        genre_ids: genre_ids.0,
        media_type: MediaKind::parse(&media_type).unwrap_or_default(),
        extended: ExtendedAttributes {
            tagline: row.get("tagline"),
            imdb_id: row.get("imdb_id"),
            original_language: row.get("original_language"),
            budget: row.get("budget"),
            revenue: row.get("revenue"),
            runtime: row.get("runtime"),
            status: row.get("status"),
            production_companies: row.get("production_companies"),
            production_countries: row.get("production_countries"),
            spoken_languages: row.get("spoken_languages"),
        },
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

/// PostgreSQL catalog store
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a new catalog store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn get_by_tmdb_id(&self, tmdb_id: i64) -> CatalogResult<Option<CatalogItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM catalog_items WHERE tmdb_id = $1",
            item_columns("")
        ))
        .bind(tmdb_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| item_from_row(&row)))
    }

    async fn get_many_by_tmdb_ids(
        &self,
        tmdb_ids: &[i64],
    ) -> CatalogResult<HashMap<i64, CatalogItem>> {
        if tmdb_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM catalog_items WHERE tmdb_id = ANY($1)",
            item_columns("")
        ))
        .bind(tmdb_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(item_from_row)
            .map(|item| (item.tmdb_id, item))
            .collect())
    }

    async fn upsert(&self, record: &CatalogRecord) -> CatalogResult<Upserted> {
        let extended = record.extended.clone().unwrap_or_default();

        // The WHERE clause mirrors `is_dirty`; no row comes back when the
        // stored copy is already current.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO catalog_items AS c (
                tmdb_id, title, overview, poster_path, backdrop_path, release_date,
                vote_average, vote_count, popularity, genre_ids, media_type,
                tagline, imdb_id, original_language, budget, revenue, runtime, status,
                production_companies, production_countries, spoken_languages
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                title = EXCLUDED.title,
                overview = EXCLUDED.overview,
                poster_path = EXCLUDED.poster_path,
                backdrop_path = EXCLUDED.backdrop_path,
                release_date = EXCLUDED.release_date,
                vote_average = EXCLUDED.vote_average,
                vote_count = EXCLUDED.vote_count,
                popularity = EXCLUDED.popularity,
                genre_ids = EXCLUDED.genre_ids,
                media_type = EXCLUDED.media_type,
                tagline = COALESCE(EXCLUDED.tagline, c.tagline),
                imdb_id = COALESCE(EXCLUDED.imdb_id, c.imdb_id),
                original_language = COALESCE(EXCLUDED.original_language, c.original_language),
                budget = COALESCE(EXCLUDED.budget, c.budget),
                revenue = COALESCE(EXCLUDED.revenue, c.revenue),
                runtime = COALESCE(EXCLUDED.runtime, c.runtime),
                status = COALESCE(EXCLUDED.status, c.status),
                production_companies = COALESCE(EXCLUDED.production_companies, c.production_companies),
                production_countries = COALESCE(EXCLUDED.production_countries, c.production_countries),
                spoken_languages = COALESCE(EXCLUDED.spoken_languages, c.spoken_languages),
                updated_at = NOW()
            WHERE ABS(c.vote_average - EXCLUDED.vote_average) > $22
               OR c.vote_count <> EXCLUDED.vote_count
               OR ABS(c.popularity - EXCLUDED.popularity) > $22
               OR c.title <> EXCLUDED.title
               OR (EXCLUDED.tagline IS NOT NULL AND c.tagline IS DISTINCT FROM EXCLUDED.tagline)
               OR (EXCLUDED.imdb_id IS NOT NULL AND c.imdb_id IS DISTINCT FROM EXCLUDED.imdb_id)
               OR (EXCLUDED.original_language IS NOT NULL AND c.original_language IS DISTINCT FROM EXCLUDED.original_language)
               OR (EXCLUDED.budget IS NOT NULL AND c.budget IS DISTINCT FROM EXCLUDED.budget)
               OR (EXCLUDED.revenue IS NOT NULL AND c.revenue IS DISTINCT FROM EXCLUDED.revenue)
               OR (EXCLUDED.runtime IS NOT NULL AND c.runtime IS DISTINCT FROM EXCLUDED.runtime)
               OR (EXCLUDED.status IS NOT NULL AND c.status IS DISTINCT FROM EXCLUDED.status)
               OR (EXCLUDED.production_companies IS NOT NULL AND c.production_companies IS DISTINCT FROM EXCLUDED.production_companies)
               OR (EXCLUDED.production_countries IS NOT NULL AND c.production_countries IS DISTINCT FROM EXCLUDED.production_countries)
               OR (EXCLUDED.spoken_languages IS NOT NULL AND c.spoken_languages IS DISTINCT FROM EXCLUDED.spoken_languages)
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            item_columns("")
        ))
        .bind(record.tmdb_id)
        .bind(&record.title)
        .bind(&record.overview)
        .bind(&record.poster_path)
        .bind(&record.backdrop_path)
        .bind(record.release_date)
        .bind(record.vote_average)
        .bind(record.vote_count)
        .bind(record.popularity)
        .bind(Json(&record.genre_ids))
        .bind(record.media_type.as_str())
        .bind(&extended.tagline)
        .bind(&extended.imdb_id)
        .bind(&extended.original_language)
        .bind(extended.budget)
        .bind(extended.revenue)
        .bind(extended.runtime)
        .bind(&extended.status)
        .bind(&extended.production_companies)
        .bind(&extended.production_countries)
        .bind(&extended.spoken_languages)
        .bind(FLOAT_EPSILON)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let inserted: bool = row.get("inserted");
            return Ok(Upserted {
                item: item_from_row(&row),
                outcome: if inserted {
                    UpsertOutcome::Inserted
                } else {
                    UpsertOutcome::Updated
                },
            });
        }

        // Conflict with a clean row: read it back untouched
        let row = sqlx::query(&format!(
            "SELECT {} FROM catalog_items WHERE tmdb_id = $1",
            item_columns("")
        ))
        .bind(record.tmdb_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Upserted {
            item: item_from_row(&row),
            outcome: UpsertOutcome::Unchanged,
        })
    }

    async fn ensure_placeholder(&self, tmdb_id: i64) -> CatalogResult<CatalogItem> {
        let placeholder = CatalogItem::placeholder(tmdb_id);

        sqlx::query(
            r#"
            INSERT INTO catalog_items (tmdb_id, title, media_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (tmdb_id) DO NOTHING
            "#,
        )
        .bind(tmdb_id)
        .bind(&placeholder.title)
        .bind(placeholder.media_type.as_str())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM catalog_items WHERE tmdb_id = $1",
            item_columns("")
        ))
        .bind(tmdb_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(item_from_row(&row))
    }

    async fn list(&self, limit: i64) -> CatalogResult<Vec<CatalogItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM catalog_items ORDER BY popularity DESC, id ASC LIMIT $1",
            item_columns("")
        ))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(item_from_row).collect())
    }

    async fn search_title(&self, query: &str, limit: i64) -> CatalogResult<Vec<CatalogItem>> {
        let pattern = format!("%{}%", escape_like(query.trim()));

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM catalog_items
            WHERE title ILIKE $1 ESCAPE '\' OR overview ILIKE $1 ESCAPE '\'
            ORDER BY popularity DESC, id ASC
            LIMIT $2
            "#,
            item_columns("")
        ))
        .bind(pattern)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(item_from_row).collect())
    }
}
