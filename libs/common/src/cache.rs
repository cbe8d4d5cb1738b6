//! Key-value cache backends for the movie discovery services
//!
//! This module provides a Redis-backed cache and an in-process TTL map behind
//! a single [`CacheStore`] trait, so callers only deal with string keys,
//! string values and optional expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tokio::sync::Mutex;
use tracing::info;

/// Which cache implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Shared Redis instance
    Redis,
    /// Per-process map, lost on restart
    Memory,
}

impl CacheBackend {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" | "local" => CacheBackend::Memory,
            _ => CacheBackend::Redis,
        }
    }
}

/// Configuration for the cache connection
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Backend selection
    pub backend: CacheBackend,
}

impl CacheConfig {
    /// Create a new CacheConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `CACHE_BACKEND`: `redis` or `memory` (default: `redis`)
    pub fn from_env() -> Result<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let backend = std::env::var("CACHE_BACKEND")
            .map(|v| CacheBackend::parse(&v))
            .unwrap_or(CacheBackend::Redis);

        Ok(CacheConfig {
            url,
            backend,
        })
    }
}

/// Minimal string cache used by every service
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value; expired and absent keys both read as `None`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with an optional TTL in seconds
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()>;

    /// Remove a key; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Open the configured cache backend
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisPool::new(config).await?)),
        CacheBackend::Memory => {
            info!("Using in-process memory cache");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

/// Redis cache over one multiplexed connection
///
/// The connection is opened once and shared; clones pipeline their commands
/// over it.
#[derive(Clone)]
pub struct RedisPool {
    conn: MultiplexedConnection,
}

impl RedisPool {
    /// Connect to Redis
    pub async fn new(config: &CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.clone())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis client connected to {}", config.url);
        Ok(RedisPool { conn })
    }

    fn get_connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.get_connection();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl CacheStore for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let mut conn = self.get_connection();

        if let Some(ttl) = ttl_seconds {
            let _: () = conn.set_ex(key, value, ttl).await?;
        } else {
            let _: () = conn.set(key, value).await?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection();
        let _: u64 = conn.del(key).await?;
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process cache with lazy TTL expiry
///
/// Expired entries are dropped when read and swept on every write. There is
/// no size bound.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|e| e.expires_at.is_none_or(|at| at > now))
            .count()
    }

    /// Whether the cache holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let expired = match entries.get(key) {
            Some(entry) => entry.expires_at.is_some_and(|at| at <= now),
            None => return Ok(None),
        };

        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<()> {
        let now = Instant::now();
        let expires_at = ttl_seconds.map(|ttl| now + Duration::from_secs(ttl));
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
