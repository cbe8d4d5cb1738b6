use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod error;
mod jwt;
mod middleware;
mod models;
mod password;
mod rate_limiter;
mod repositories;
mod routes;
mod state;
mod validation;

use common::{
    cache::{CacheConfig, connect},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use tokio::net::TcpListener;

use crate::{
    config::AuthConfig,
    jwt::{JwtConfig, JwtService},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::PgUserRepository,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting authentication service");

    let auth_config = AuthConfig::load()?;
    let jwt_service = JwtService::new(JwtConfig::from_env()?);

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    run_migrations(&pool).await?;

    let cache = connect(&CacheConfig::from_env()?).await?;

    let app_state = AppState {
        users: Arc::new(PgUserRepository::new(pool)),
        cache,
        jwt_service,
        rate_limiter: RateLimiter::new(RateLimiterConfig::from_env()),
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let address = auth_config.address();
    let listener = TcpListener::bind(&address).await?;
    info!("Authentication service listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Authentication service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
