//! Scheduled ingestion of TMDB listings into the catalog

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use catalog::{CatalogResult, CatalogSync, ContentProvider};
use tokio::time::sleep;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::IngestConfig;

/// Upper bound for a single backoff delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .min(MAX_RETRY_DELAY)
}

/// Totals of one ingestion run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: u32,
    pub synced: usize,
    pub skipped: usize,
    pub failed_pages: u32,
}

#[derive(Debug, Default)]
struct PageOutcome {
    synced: usize,
    skipped: usize,
    /// TMDB has no more pages after this one
    last: bool,
    /// The provider answered with generated data
    placeholder: bool,
}

/// Pulls listing pages from the provider and syncs them into the store
#[derive(Clone)]
pub struct Ingestor {
    provider: Arc<dyn ContentProvider>,
    sync: CatalogSync,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(provider: Arc<dyn ContentProvider>, sync: CatalogSync, config: IngestConfig) -> Self {
        Self {
            provider,
            sync,
            config,
        }
    }

    /// Ingest pages 1..=`pages` of the configured listing
    pub async fn run_once(&self) -> IngestReport {
        let kind = self.config.kind;
        info!(kind = kind.as_str(), pages = self.config.pages, "Starting catalog ingestion");

        let mut report = IngestReport::default();
        for page in 1..=self.config.pages {
            match self.ingest_page_with_retry(page).await {
                Some(outcome) if outcome.placeholder => {
                    warn!(page, "Provider returned generated data, stopping ingestion");
                    break;
                }
                Some(outcome) => {
                    report.pages += 1;
                    report.synced += outcome.synced;
                    report.skipped += outcome.skipped;
                    info!(page, synced = outcome.synced, "Page ingested");
                    if outcome.last {
                        break;
                    }
                }
                None => report.failed_pages += 1,
            }
        }

        info!(
            kind = kind.as_str(),
            pages = report.pages,
            synced = report.synced,
            skipped = report.skipped,
            failed_pages = report.failed_pages,
            "Catalog ingestion finished"
        );
        report
    }

    async fn ingest_page_with_retry(&self, page: u32) -> Option<PageOutcome> {
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            match self.ingest_page(page).await {
                Ok(outcome) => return Some(outcome),
                Err(e) => {
                    attempt += 1;
                    error!(
                        "Failed to ingest page {} (attempt {}/{}): {}",
                        page, attempt, max_retries, e
                    );
                    // A store refusing the record fails the same way every time
                    let permanent = !e.is_retryable() && !e.is_provider_error();
                    if permanent || attempt >= max_retries {
                        warn!(target: "dead_letter", page, "Giving up on page");
                        return None;
                    }
                    sleep(backoff_delay(self.config.retry_base, attempt)).await;
                }
            }
        }
    }

    async fn ingest_page(&self, page: u32) -> CatalogResult<PageOutcome> {
        let kind = self.config.kind;
        let listing = self.provider.listing(kind, page).await?;
        if listing.placeholder {
            return Ok(PageOutcome {
                placeholder: true,
                ..PageOutcome::default()
            });
        }

        let mut outcome = PageOutcome {
            last: listing.page >= listing.total_pages,
            ..PageOutcome::default()
        };
        for raw in &listing.results {
            match self.sync.sync_record(raw, kind.default_media_kind()).await? {
                Some(_) => outcome.synced += 1,
                None => outcome.skipped += 1,
            }
        }
        Ok(outcome)
    }

    /// Run [`run_once`](Self::run_once) on the configured cron schedule
    pub async fn start(self) -> Result<JobScheduler> {
        let schedule = self.config.schedule.clone();
        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule.as_str(), move |_, _| {
            let ingestor = self.clone();
            Box::pin(async move {
                ingestor.run_once().await;
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!("Started ingestion scheduler with schedule: {}", schedule);
        Ok(scheduler)
    }
}
