//! Deterministic placeholder pages.
//!
//! Every value here is a pure function of the listing, page, position and
//! (for search) the query, so two calls with the same inputs produce the same
//! page byte for byte.

use serde_json::{Value, json};

use crate::models::{Genre, GenreList, ListingKind, ProviderPage};

/// Results per generated page
pub const PAGE_SIZE: u32 = 20;
/// Pages advertised by generated listings
pub const LISTING_PAGES: u32 = 500;
/// Pages advertised by generated search results
pub const SEARCH_PAGES: u32 = 5;

// Each source gets its own id block; blocks are wider than any page range
const BLOCK: i64 = 1_000_000;
const ID_BASE: i64 = 900_000_000;

const MOVIE_GENRES: [(i64, &str); 19] = [
    (28, "Action"),
    (12, "Adventure"),
    (16, "Animation"),
    (35, "Comedy"),
    (80, "Crime"),
    (99, "Documentary"),
    (18, "Drama"),
    (10751, "Family"),
    (14, "Fantasy"),
    (36, "History"),
    (27, "Horror"),
    (10402, "Music"),
    (9648, "Mystery"),
    (10749, "Romance"),
    (878, "Science Fiction"),
    (10770, "TV Movie"),
    (53, "Thriller"),
    (10752, "War"),
    (37, "Western"),
];

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Listing(ListingKind),
    Search(&'a str),
}

impl Source<'_> {
    fn block(&self) -> i64 {
        let slot = match self {
            Source::Listing(ListingKind::Trending) => 0,
            Source::Listing(ListingKind::TopRated) => 1,
            Source::Listing(ListingKind::Tv) => 2,
            Source::Listing(ListingKind::Movie) => 3,
            Source::Search(_) => 4,
        };
        ID_BASE + slot * BLOCK
    }

    fn total_pages(&self) -> u32 {
        match self {
            Source::Listing(_) => LISTING_PAGES,
            Source::Search(_) => SEARCH_PAGES,
        }
    }
}

/// Generated page for a listing
pub fn listing_page(kind: ListingKind, page: u32) -> ProviderPage {
    build_page(Source::Listing(kind), page)
}

/// Generated page of search results; titles contain the query
pub fn search_page(query: &str, page: u32) -> ProviderPage {
    build_page(Source::Search(query.trim()), page)
}

/// The fixed TMDB movie genre table
pub fn genres() -> GenreList {
    GenreList {
        genres: MOVIE_GENRES
            .iter()
            .map(|(id, name)| Genre {
                id: *id,
                name: name.to_string(),
            })
            .collect(),
        placeholder: true,
    }
}

fn build_page(source: Source<'_>, page: u32) -> ProviderPage {
    let page = page.max(1);
    let total_pages = source.total_pages();

    // Past the last page TMDB answers with nothing
    let results = if page > total_pages {
        Vec::new()
    } else {
        (0..PAGE_SIZE).map(|index| item(source, page, index)).collect()
    };

    ProviderPage {
        page,
        results,
        total_pages,
        total_results: total_pages * PAGE_SIZE,
        placeholder: true,
    }
}

fn item(source: Source<'_>, page: u32, index: u32) -> Value {
    let position = i64::from((page - 1) * PAGE_SIZE + index + 1);
    let id = source.block() + position;

    let is_tv = match source {
        Source::Listing(ListingKind::Tv) => true,
        Source::Listing(ListingKind::Trending) => index % 5 == 4,
        _ => false,
    };

    let title = match source {
        Source::Listing(ListingKind::Trending) => format!("Trending Title {}", position),
        Source::Listing(ListingKind::TopRated) => format!("Top Rated Movie {}", position),
        Source::Listing(ListingKind::Tv) => format!("Popular Show {}", position),
        Source::Listing(ListingKind::Movie) => format!("Popular Movie {}", position),
        Source::Search(query) => format!("{} (Result {})", query, position),
    };
    let overview = format!(
        "Placeholder overview for \"{}\". Live data is temporarily unavailable.",
        title
    );

    let date = format!(
        "{}-{:02}-{:02}",
        1980 + id % 45,
        1 + id % 12,
        1 + id % 28
    );
    let vote_average = 5.0 + (id % 50) as f64 / 10.0;
    let vote_count = 100 + (id * 37) % 5000;
    let popularity = 10.0 + ((id * 13) % 1000) as f64 / 10.0;
    let genre_ids: Vec<i64> = [id % 19, (id / 19) % 19]
        .iter()
        .map(|slot| MOVIE_GENRES[*slot as usize].0)
        .collect();

    let mut value = json!({
        "id": id,
        "overview": overview,
        "poster_path": Value::Null,
        "backdrop_path": Value::Null,
        "vote_average": vote_average,
        "vote_count": vote_count,
        "popularity": popularity,
        "genre_ids": genre_ids,
        "media_type": if is_tv { "tv" } else { "movie" },
    });

    if is_tv {
        value["name"] = json!(title);
        value["first_air_date"] = json!(date);
    } else {
        value["title"] = json!(title);
        value["release_date"] = json!(date);
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CatalogRecord;
    use std::collections::HashSet;

    #[test]
    fn test_listing_page_shape() {
        let page = listing_page(ListingKind::Trending, 3);
        assert_eq!(page.page, 3);
        assert_eq!(page.results.len(), 20);
        assert_eq!(page.total_pages, 500);
        assert_eq!(page.total_results, 10_000);
        assert!(page.placeholder);
    }

    #[test]
    fn test_pages_are_deterministic() {
        assert_eq!(
            listing_page(ListingKind::Movie, 7),
            listing_page(ListingKind::Movie, 7)
        );
        assert_eq!(search_page("matrix", 2), search_page("matrix", 2));
    }

    #[test]
    fn test_ids_are_disjoint_across_sources() {
        let mut seen = HashSet::new();
        let pages = [
            listing_page(ListingKind::Trending, 1),
            listing_page(ListingKind::TopRated, 1),
            listing_page(ListingKind::Tv, 1),
            listing_page(ListingKind::Movie, 1),
            listing_page(ListingKind::Movie, 500),
            search_page("alien", 1),
        ];

        for page in &pages {
            for result in &page.results {
                let id = result["id"].as_i64().unwrap();
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
    }

    #[test]
    fn test_search_titles_contain_query() {
        let page = search_page("  Blade Runner ", 1);
        assert_eq!(page.total_pages, 5);
        assert_eq!(page.total_results, 100);
        for result in &page.results {
            assert!(result["title"].as_str().unwrap().contains("Blade Runner"));
        }
    }

    #[test]
    fn test_tv_results_use_name_and_air_date() {
        let page = listing_page(ListingKind::Tv, 1);
        for result in &page.results {
            assert!(result.get("name").is_some());
            assert!(result.get("first_air_date").is_some());
            assert!(result.get("title").is_none());
        }
    }

    #[test]
    fn test_generated_items_normalize() {
        for result in &listing_page(ListingKind::Trending, 1).results {
            let record = CatalogRecord::from_raw(result).unwrap();
            assert!(record.release_date.is_some());
            assert!((5.0..10.0).contains(&record.vote_average));
            assert_eq!(record.genre_ids.len(), 2);
        }
    }

    #[test]
    fn test_past_last_page_is_empty() {
        let page = search_page("x", 6);
        assert!(page.results.is_empty());
        assert_eq!(page.page, 6);

        let page = listing_page(ListingKind::Movie, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.results.len(), 20);
    }

    #[test]
    fn test_genre_table() {
        let list = genres();
        assert_eq!(list.genres.len(), 19);
        assert_eq!(list.genres[0].name, "Action");
        assert!(list.placeholder);
    }
}
