//! Testing utilities and in-memory implementations of the catalog traits.
//!
//! These back unit tests here and router tests in the services, so no
//! PostgreSQL, Redis or TMDB access is needed.
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog::testing::{MemoryCatalogStore, MockProvider, fixtures};
//!
//! let provider = MockProvider::new();
//! provider.set_details(550, fixtures::details(550, "Fight Club")).await;
//!
//! let store = MemoryCatalogStore::new();
//! store.seed(fixtures::record(603, "The Matrix")).await;
//! ```

mod memory_catalog_store;
mod memory_preference_store;
mod mock_provider;

pub use memory_catalog_store::MemoryCatalogStore;
pub use memory_preference_store::MemoryPreferenceStore;
pub use mock_provider::MockProvider;

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{Value, json};

    use crate::models::{Genre, GenreList, ProviderPage};
    use crate::record::CatalogRecord;

    /// A raw TMDB movie result
    pub fn raw_movie(tmdb_id: i64, title: &str) -> Value {
        json!({
            "id": tmdb_id,
            "title": title,
            "overview": format!("Overview of {}", title),
            "release_date": "1999-10-15",
            "poster_path": format!("/poster_{}.jpg", tmdb_id),
            "vote_average": 7.5,
            "vote_count": 1000,
            "popularity": 10.0,
            "genre_ids": [18],
            "media_type": "movie"
        })
    }

    /// A normalized movie record
    pub fn record(tmdb_id: i64, title: &str) -> CatalogRecord {
        CatalogRecord::from_raw(&raw_movie(tmdb_id, title))
            .unwrap_or_else(|e| panic!("fixture record is invalid: {}", e))
    }

    /// A real (non-generated) page holding the given movies in order
    pub fn provider_page(page: u32, movies: &[(i64, &str)]) -> ProviderPage {
        ProviderPage {
            page,
            results: movies
                .iter()
                .map(|(id, title)| raw_movie(*id, title))
                .collect(),
            total_pages: 10,
            total_results: 200,
            placeholder: false,
        }
    }

    /// A `/movie/{id}` payload with credits and videos appended
    pub fn details(tmdb_id: i64, title: &str) -> Value {
        let mut raw = raw_movie(tmdb_id, title);
        if let Some(object) = raw.as_object_mut() {
            object.remove("media_type");
            object.remove("genre_ids");
            object.insert("genres".to_string(), json!([{"id": 18, "name": "Drama"}]));
            object.insert("tagline".to_string(), json!("Mischief. Mayhem. Soap."));
            object.insert("runtime".to_string(), json!(139));
            object.insert("budget".to_string(), json!(63_000_000));
            object.insert("status".to_string(), json!("Released"));
            object.insert(
                "credits".to_string(),
                json!({"cast": [{"id": 819, "name": "Edward Norton"}], "crew": []}),
            );
            object.insert("videos".to_string(), json!({"results": []}));
        }
        raw
    }

    /// A small real genre table
    pub fn genre_list() -> GenreList {
        GenreList {
            genres: vec![
                Genre {
                    id: 28,
                    name: "Action".to_string(),
                },
                Genre {
                    id: 18,
                    name: "Drama".to_string(),
                },
            ],
            placeholder: false,
        }
    }
}
