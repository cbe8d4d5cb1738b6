//! Common library for the movie discovery services
//!
//! This crate provides shared functionality used across the services,
//! including database connectivity and migrations, key-value caching and
//! infrastructure error types.
//!
//! ```rust,no_run
//! use common::cache::{CacheConfig, connect};
//! use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     run_migrations(&pool).await?;
//!     assert!(health_check(&pool).await?);
//!
//!     let cache = connect(&CacheConfig::from_env()?).await?;
//!     cache.set("greeting", "hello", Some(60)).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
