//! Movie catalog library
//!
//! Wraps the TMDB API behind a cache-first query service, mirrors what it
//! sees into the local catalog through a background sync queue and keeps
//! per-user favorites, watchlists and ratings.
//!
//! When TMDB cannot be reached, list and search requests are answered from
//! the local catalog instead and flagged with a `local` source.

pub mod cache;
pub mod error;
pub mod models;
pub mod preferences;
pub mod query;
pub mod record;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tmdb;

pub use cache::{CacheClass, MovieCache};
pub use error::{CatalogError, CatalogResult};
pub use models::{
    CatalogItem, CatalogPage, GenreList, ItemDetails, ListingKind, MediaKind, PreferenceCounts,
    PreferenceFlags, QueryOutcome, Rating, SavedItem, SavedList,
};
pub use preferences::{PgPreferenceStore, PreferenceService, PreferenceStore};
pub use query::CatalogQueryService;
pub use record::CatalogRecord;
pub use store::{CatalogStore, PgCatalogStore};
pub use sync::{CatalogSync, SyncConfig, SyncHandle, SyncQueue};
pub use tmdb::{ContentProvider, TmdbClient, TmdbConfig};
