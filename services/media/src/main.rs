use std::sync::Arc;

use anyhow::Result;
use catalog::{CatalogSync, PgCatalogStore, TmdbClient, TmdbConfig};
use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod ingest;

use crate::{config::IngestConfig, ingest::Ingestor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting catalog ingestion service");

    let ingest_config = IngestConfig::load()?;

    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let provider = Arc::new(TmdbClient::new(TmdbConfig::from_env())?);
    let sync = CatalogSync::new(Arc::new(PgCatalogStore::new(pool)));

    let mut scheduler = Ingestor::new(provider, sync, ingest_config).start().await?;

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down catalog ingestion service");
    scheduler.shutdown().await?;

    Ok(())
}
