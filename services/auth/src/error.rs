//! Error type for the authentication service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid input
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Your account has been disabled. Please contact support.")]
    AccountDisabled,

    #[error("Not found")]
    NotFound,

    /// Username or email already registered
    #[error("{0}")]
    Conflict(String),

    #[error("Too many login attempts, try again later")]
    RateLimited,

    #[error("Internal server error")]
    InternalServerError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized
            | AuthError::InvalidCredentials
            | AuthError::AccountDisabled => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!("Auth request failed: {:#}", e);
        AuthError::InternalServerError
    }
}

/// Type alias for auth handler results
pub type AuthResult<T> = Result<T, AuthError>;
