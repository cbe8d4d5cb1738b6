//! Error types for the catalog layer

use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLSTATE classes worth another attempt: connection exception,
/// transaction rollback (serialization failure, deadlock), insufficient
/// resources and operator intervention
const TRANSIENT_SQLSTATE_CLASSES: [&str; 4] = ["08", "40", "53", "57"];

/// Errors raised by the TMDB client, the catalog store and the services built on them
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Transport failure, timeout, 5xx or missing credentials
    #[error("TMDB unavailable: {0}")]
    ProviderUnavailable(String),

    /// TMDB answered with something we could not use
    #[error("TMDB returned an unusable response: {0}")]
    ProviderBadResponse(String),

    /// Item absent from both TMDB and the local store
    #[error("Not found: {0}")]
    NotFound(String),

    /// PostgreSQL error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage error from a non-SQL backend
    #[error("Storage error: {0}")]
    Storage(String),

    /// A non-SQL backend refused the record itself
    #[error("Record rejected by store: {0}")]
    Rejected(String),

    /// Rating outside 1..=5
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i32),

    /// Non-positive TMDB id
    #[error("movie_id must be a positive integer, got {0}")]
    InvalidItem(i64),

    /// The background sync queue no longer accepts batches
    #[error("Sync queue is closed")]
    QueueClosed,
}

impl CatalogError {
    /// Whether the error came from TMDB rather than from local storage
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            CatalogError::ProviderUnavailable(_) | CatalogError::ProviderBadResponse(_)
        )
    }

    /// Whether retrying the same write could succeed
    ///
    /// Constraint and data errors are permanent: the same record fails the
    /// same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Database(e) => is_transient(e),
            CatalogError::Storage(_) => true,
            _ => false,
        }
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => {
            matches!(db.kind(), ErrorKind::Other)
                && db.code().is_some_and(|code| {
                    TRANSIENT_SQLSTATE_CLASSES
                        .iter()
                        .any(|class| code.starts_with(class))
                })
        }
        _ => false,
    }
}

/// Type alias for Result with CatalogError
pub type CatalogResult<T> = Result<T, CatalogError>;
