//! Authentication middleware for JWT token validation

use axum::{
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::debug;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT claims issued by the auth service
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Unique token id
    #[serde(default)]
    pub jti: Option<Uuid>,
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// Authenticated user information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared HS256 secret, same as the auth service
    pub secret: String,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: HS256 signing secret
    pub fn from_env() -> Result<Self, String> {
        let secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET environment variable not set".to_string())?;
        if secret.trim().is_empty() {
            return Err("JWT_SECRET is empty".to_string());
        }

        Ok(JwtConfig { secret })
    }

    /// Validate an access token and return its user
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, ApiError> {
        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let token_data = jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| {
                debug!("Rejected token: {}", e);
                ApiError::Unauthorized
            })?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized);
        }

        Ok(AuthUser {
            id: token_data.claims.sub,
        })
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let user = state.jwt.authenticate(token)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub const SECRET: &str = "test-secret";

    pub fn token_for(user_id: Uuid, token_type: TokenType, ttl: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: (now as i64 + ttl) as u64,
            token_type,
            jti: Some(Uuid::new_v4()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn config() -> JwtConfig {
        JwtConfig {
            secret: SECRET.to_string(),
        }
    }

    #[test]
    fn test_access_token_accepted() {
        let user_id = Uuid::new_v4();
        let token = token_for(user_id, TokenType::Access, 900);
        assert_eq!(config().authenticate(&token).unwrap().id, user_id);
    }

    #[test]
    fn test_refresh_token_rejected() {
        let token = token_for(Uuid::new_v4(), TokenType::Refresh, 900);
        assert!(matches!(
            config().authenticate(&token),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = token_for(Uuid::new_v4(), TokenType::Access, -3600);
        assert!(config().authenticate(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = token_for(Uuid::new_v4(), TokenType::Access, 900);
        let other = JwtConfig {
            secret: "another-secret".to_string(),
        };
        assert!(other.authenticate(&token).is_err());
    }
}
