//! Rate limiter for login attempts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,        // 5 minutes
            ban_duration_seconds: 3600, // 1 hour
        }
    }
}

impl RateLimiterConfig {
    /// Create a new RateLimiterConfig from environment variables
    ///
    /// # Environment Variables
    /// - `LOGIN_MAX_ATTEMPTS`: attempts per window (default: 5)
    /// - `LOGIN_WINDOW_SECONDS`: window length (default: 300)
    /// - `LOGIN_BAN_SECONDS`: ban after too many attempts (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |var: &str| std::env::var(var).ok().and_then(|v| v.parse::<u64>().ok());

        Self {
            max_attempts: read("LOGIN_MAX_ATTEMPTS")
                .map(|v| v.max(1) as u32)
                .unwrap_or(defaults.max_attempts),
            window_seconds: read("LOGIN_WINDOW_SECONDS").unwrap_or(defaults.window_seconds),
            ban_duration_seconds: read("LOGIN_BAN_SECONDS")
                .unwrap_or(defaults.ban_duration_seconds),
        }
    }
}

/// Rate limiter entry
#[derive(Debug)]
struct RateLimiterEntry {
    /// Number of attempts
    attempts: u32,
    /// Last attempt time
    last_attempt: Instant,
    /// Ban expiration time
    ban_expires: Option<Instant>,
}

/// Attempt counter keyed by login identifier
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt for `key` and report whether it may proceed
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let entry = entries.entry(key.to_string()).or_insert(RateLimiterEntry {
            attempts: 0,
            last_attempt: now,
            ban_expires: None,
        });

        if let Some(ban_expires) = entry.ban_expires {
            if now < ban_expires {
                return false;
            }
            entry.attempts = 0;
            entry.ban_expires = None;
        }

        if now.duration_since(entry.last_attempt) >= Duration::from_secs(self.config.window_seconds)
        {
            entry.attempts = 0;
        }

        if entry.attempts >= self.config.max_attempts {
            entry.ban_expires = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            warn!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
            return false;
        }

        entry.attempts += 1;
        entry.last_attempt = now;
        true
    }

    /// Forget the attempts of `key`, after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn limiter(max_attempts: u32) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts,
            window_seconds: 300,
            ban_duration_seconds: 3600,
        })
    }

    #[tokio::test]
    async fn test_blocks_after_max_attempts() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.is_allowed("neo@example.com").await);
        }
        assert!(!limiter.is_allowed("neo@example.com").await);
        assert!(!limiter.is_allowed("neo@example.com").await);

        // Other identifiers are unaffected
        assert!(limiter.is_allowed("trinity@example.com").await);
    }

    #[tokio::test]
    async fn test_reset_clears_attempts() {
        let limiter = limiter(2);
        assert!(limiter.is_allowed("neo").await);
        assert!(limiter.is_allowed("neo").await);
        limiter.reset("neo").await;
        assert!(limiter.is_allowed("neo").await);
    }

    #[tokio::test]
    async fn test_ban_expires() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_attempts: 1,
            window_seconds: 300,
            ban_duration_seconds: 0,
        });
        assert!(limiter.is_allowed("neo").await);
        assert!(!limiter.is_allowed("neo").await);
        assert!(limiter.is_allowed("neo").await);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        unsafe {
            env::set_var("LOGIN_MAX_ATTEMPTS", "10");
            env::set_var("LOGIN_WINDOW_SECONDS", "not-a-number");
            env::remove_var("LOGIN_BAN_SECONDS");
        }

        let config = RateLimiterConfig::from_env();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.window_seconds, 300);
        assert_eq!(config.ban_duration_seconds, 3600);

        unsafe {
            env::remove_var("LOGIN_MAX_ATTEMPTS");
            env::remove_var("LOGIN_WINDOW_SECONDS");
        }
    }
}
