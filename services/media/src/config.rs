//! Ingestion schedule configuration

use std::time::Duration;

use catalog::models::ListingKind;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawIngestConfig {
    schedule: String,
    kind: String,
    pages: u32,
    max_retries: u32,
    retry_base_ms: u64,
}

/// What to ingest and how often
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Six-field cron expression, seconds first
    pub schedule: String,
    pub kind: ListingKind,
    /// Pages fetched per run, starting at page 1
    pub pages: u32,
    /// Attempts per page before it is given up
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry
    pub retry_base: Duration,
}

impl IngestConfig {
    /// Load ingestion settings, defaults overridden by the environment
    ///
    /// # Environment Variables
    /// - `SYNC_SCHEDULE`: cron expression (default: `0 0 * * * *`, hourly)
    /// - `SYNC_KIND`: `trending`, `top_rated`, `movie` or `tv` (default: trending)
    /// - `SYNC_PAGES`: pages per run (default: 5)
    /// - `SYNC_MAX_RETRIES`: attempts per page, 1 to 10 (default: 3)
    /// - `SYNC_RETRY_BASE_MS`: first backoff delay (default: 1000)
    pub fn load() -> Result<Self, config::ConfigError> {
        let raw: RawIngestConfig = config::Config::builder()
            .set_default("schedule", "0 0 * * * *")?
            .set_default("kind", "trending")?
            .set_default("pages", 5)?
            .set_default("max_retries", 3)?
            .set_default("retry_base_ms", 1000)?
            .add_source(config::Environment::with_prefix("SYNC").try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(Self {
            schedule: raw.schedule,
            kind: ListingKind::parse(&raw.kind),
            pages: raw.pages.max(1),
            max_retries: raw.max_retries.clamp(1, 10),
            retry_base: Duration::from_millis(raw.retry_base_ms),
        })
    }
}
