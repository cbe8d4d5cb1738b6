//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use crate::{error::AuthError, jwt::TokenType, state::AppState};

/// Id of the user behind a validated access token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
}

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AuthError::Unauthorized)?;

    let claims = state.jwt_service.validate_token(token).map_err(|e| {
        debug!("Failed to validate token: {}", e);
        AuthError::Unauthorized
    })?;

    if claims.token_type != TokenType::Access {
        return Err(AuthError::Unauthorized);
    }

    req.extensions_mut().insert(AuthUser { id: claims.sub });

    Ok(next.run(req).await)
}
