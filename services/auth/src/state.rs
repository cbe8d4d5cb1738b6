//! Application state shared across handlers

use std::sync::Arc;

use common::cache::CacheStore;

use crate::{jwt::JwtService, rate_limiter::RateLimiter, repositories::UserRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    /// Holds the refresh token blacklist
    pub cache: Arc<dyn CacheStore>,
    pub jwt_service: JwtService,
    pub rate_limiter: RateLimiter,
}
