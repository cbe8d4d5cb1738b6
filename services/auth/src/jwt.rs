//! JWT service for token generation, validation, and management
//!
//! Tokens are signed with HS256 using a secret shared with the API service.
//! Refresh tokens are rotated on use; the old token's id is blacklisted in the
//! cache for the rest of its lifetime.

use anyhow::Result;
use common::cache::CacheStore;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use uuid::Uuid;

use crate::models::User;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 signing secret
    pub secret: String,
    /// Access token expiration time in seconds (default: 15 minutes)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 7 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: HS256 signing secret, shared with the API service
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 900)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 604800)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
        if secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET is empty");
        }

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "900".to_string()) // 15 minutes
            .parse()
            .unwrap_or(900);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "604800".to_string()) // 7 days
            .parse()
            .unwrap_or(604800);

        Ok(JwtConfig {
            secret,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Unique token id, the blacklist key
    pub jti: Uuid,
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// An access and refresh token issued together
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

fn now_seconds() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}

fn blacklist_key(jti: Uuid) -> String {
    format!("blacklisted_token:{}", jti)
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        }
    }

    fn issue(&self, user: &User, token_type: TokenType, ttl: u64) -> Result<String> {
        let now = now_seconds()?;
        let claims = Claims {
            sub: user.id,
            iat: now,
            exp: now + ttl,
            token_type,
            jti: Uuid::new_v4(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Access, self.config.access_token_expiry)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user: &User) -> Result<String> {
        self.issue(user, TokenType::Refresh, self.config.refresh_token_expiry)
    }

    /// Issue a fresh access and refresh token
    pub fn generate_pair(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access: self.generate_access_token(user)?,
            refresh: self.generate_refresh_token(user)?,
        })
    }

    /// Validate a token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }

    /// Check if a token is blacklisted
    pub async fn is_token_blacklisted(&self, cache: &dyn CacheStore, claims: &Claims) -> Result<bool> {
        Ok(cache.get(&blacklist_key(claims.jti)).await?.is_some())
    }

    /// Blacklist a token until it would have expired anyway
    pub async fn blacklist_token(&self, cache: &dyn CacheStore, claims: &Claims) -> Result<()> {
        let remaining = claims.exp.saturating_sub(now_seconds()?).max(1);
        cache
            .set(&blacklist_key(claims.jti), "1", Some(remaining))
            .await?;
        Ok(())
    }

    /// Get the access token expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Rotate a refresh token
    ///
    /// Blacklists the old refresh token and issues a new pair for the same user.
    pub async fn rotate_refresh_token(
        &self,
        cache: &dyn CacheStore,
        user: &User,
        old_claims: &Claims,
    ) -> Result<TokenPair> {
        if old_claims.token_type != TokenType::Refresh {
            anyhow::bail!("Token is not a refresh token");
        }

        if old_claims.sub != user.id {
            anyhow::bail!("Token does not belong to user");
        }

        self.blacklist_token(cache, old_claims).await?;
        info!("Rotated refresh token for user {}", user.id);

        self.generate_pair(user)
    }
}
