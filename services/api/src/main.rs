use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod error;
mod middleware;
mod models;
mod repositories;
mod routes;
mod state;

use catalog::{
    CatalogQueryService, CatalogSync, MovieCache, PgCatalogStore, PgPreferenceStore,
    PreferenceService, SyncConfig, SyncQueue, TmdbClient, TmdbConfig,
};
use common::{
    cache::{CacheConfig, connect},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use tokio::net::TcpListener;

use crate::{
    config::ApiConfig, middleware::JwtConfig, repositories::PgUserRepository, state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting API service");

    let api_config = ApiConfig::load()?;
    let jwt = JwtConfig::from_env().map_err(anyhow::Error::msg)?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let cache = MovieCache::new(connect(&CacheConfig::from_env()?).await?);

    let provider = Arc::new(TmdbClient::new(TmdbConfig::from_env())?);

    let store = Arc::new(PgCatalogStore::new(pool.clone()));
    let queue = SyncQueue::start(CatalogSync::new(store.clone()), &SyncConfig::from_env());

    let app_state = AppState {
        catalog: CatalogQueryService::new(provider, store.clone(), cache.clone(), queue.handle()),
        preferences: PreferenceService::new(
            Arc::new(PgPreferenceStore::new(pool.clone())),
            store,
            cache,
        ),
        users: Arc::new(PgUserRepository::new(pool)),
        jwt,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let address = api_config.address();
    let listener = TcpListener::bind(&address).await?;
    info!("API service listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = queue.shutdown().await;
    info!(
        synced = stats.synced,
        dead_lettered = stats.dead_lettered,
        "API service stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
