//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{AuthError, AuthResult},
    jwt::{TokenPair, TokenType},
    middleware::{AuthUser, auth_middleware},
    models::{NewUser, UpdateProfile, UserResponse},
    password::{hash_password, verify_password},
    repositories::DuplicateUser,
    state::AppState,
    validation::{validate_bio, validate_email, validate_name, validate_password, validate_username},
};

/// Request for user registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Request for user login
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Email, or username
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

/// Request carrying a refresh token
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    #[serde(alias = "refresh")]
    pub refresh_token: String,
}

/// Request for a password change
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Response for register and login
#[derive(Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserResponse,
    pub tokens: TokenPair,
    pub token_type: String,
    pub expires_in: u64,
}

/// Response for token refresh
#[derive(Serialize)]
pub struct RefreshTokenResponse {
    pub tokens: TokenPair,
    pub token_type: String,
    pub expires_in: u64,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route("/auth/change-password", post(change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

fn bad_request(e: String) -> AuthError {
    AuthError::BadRequest(e)
}

fn duplicate_user() -> AuthError {
    AuthError::Conflict("A user with this username or email already exists".to_string())
}

/// User registration endpoint
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();
    let username = payload.username.trim().to_string();

    validate_email(&email).map_err(bad_request)?;
    validate_username(&username).map_err(bad_request)?;
    validate_password(&payload.password).map_err(bad_request)?;
    if payload.password != payload.confirm_password {
        return Err(AuthError::BadRequest("Passwords don't match".to_string()));
    }
    validate_name("First name", &payload.first_name).map_err(bad_request)?;
    validate_name("Last name", &payload.last_name).map_err(bad_request)?;

    if state.users.exists(&username, &email).await? {
        return Err(duplicate_user());
    }

    // A concurrent registration can still win the insert
    let user = state
        .users
        .create(&NewUser {
            username,
            email,
            password_hash: hash_password(&payload.password)?,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
        })
        .await
        .map_err(|e| match e.downcast_ref::<DuplicateUser>() {
            Some(_) => duplicate_user(),
            None => AuthError::from(e),
        })?;

    info!("Registered user {}", user.id);

    let response = AuthResponse {
        message: "User registered successfully".to_string(),
        user: UserResponse::from(&user),
        tokens: state.jwt_service.generate_pair(&user)?,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let identifier = payload.email.trim().to_lowercase();
    if identifier.is_empty() || payload.password.is_empty() {
        return Err(AuthError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    if !state.rate_limiter.is_allowed(&identifier).await {
        warn!("Login rate limited for {}", identifier);
        return Err(AuthError::RateLimited);
    }

    let user = state
        .users
        .find_by_username_or_email(payload.email.trim())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&user.password_hash, &payload.password)? {
        return Err(AuthError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AuthError::AccountDisabled);
    }

    state.rate_limiter.reset(&identifier).await;
    info!("User {} logged in", user.id);

    let response = AuthResponse {
        message: "Login successful".to_string(),
        user: UserResponse::from(&user),
        tokens: state.jwt_service.generate_pair(&user)?,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    };

    Ok(Json(response))
}

/// Refresh token endpoint; the presented token is rotated out
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token)
        .map_err(|_| AuthError::Unauthorized)?;

    if claims.token_type != TokenType::Refresh {
        return Err(AuthError::Unauthorized);
    }

    if state
        .jwt_service
        .is_token_blacklisted(state.cache.as_ref(), &claims)
        .await?
    {
        return Err(AuthError::Unauthorized);
    }

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .filter(|user| user.is_active)
        .ok_or(AuthError::Unauthorized)?;

    let tokens = state
        .jwt_service
        .rotate_refresh_token(state.cache.as_ref(), &user, &claims)
        .await?;

    Ok(Json(RefreshTokenResponse {
        tokens,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    }))
}

/// Logout endpoint; blacklists the refresh token
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token)
        .map_err(|_| AuthError::Unauthorized)?;

    if claims.token_type != TokenType::Refresh {
        return Err(AuthError::Unauthorized);
    }

    state
        .jwt_service
        .blacklist_token(state.cache.as_ref(), &claims)
        .await?;
    info!("User {} logged out", claims.sub);

    Ok(Json(serde_json::json!({"message": "Logged out successfully"})))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(AuthError::NotFound)?;

    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdateProfile>,
) -> AuthResult<impl IntoResponse> {
    if let Some(first_name) = &payload.first_name {
        validate_name("First name", first_name).map_err(bad_request)?;
    }
    if let Some(last_name) = &payload.last_name {
        validate_name("Last name", last_name).map_err(bad_request)?;
    }
    if let Some(bio) = &payload.bio {
        validate_bio(bio).map_err(bad_request)?;
    }

    let user = state
        .users
        .update_profile(user.id, &payload)
        .await?
        .ok_or(AuthError::NotFound)?;

    Ok(Json(UserResponse::from(&user)))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(AuthError::NotFound)?;

    if !verify_password(&user.password_hash, &payload.current_password)? {
        return Err(AuthError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }
    if payload.new_password != payload.confirm_password {
        return Err(AuthError::BadRequest(
            "New passwords don't match".to_string(),
        ));
    }
    validate_password(&payload.new_password).map_err(bad_request)?;

    state
        .users
        .update_password(user.id, &hash_password(&payload.new_password)?)
        .await?;

    Ok(Json(serde_json::json!({"message": "Password changed successfully"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{JwtService, tests::test_config};
    use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
    use crate::models::User;
    use crate::repositories::{MemoryUserRepository, UserRepository};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use common::cache::MemoryCache;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const PASSWORD: &str = "Sup3r$ecret";

    fn app() -> Router {
        app_with(Arc::new(MemoryUserRepository::new()))
    }

    fn app_with(users: Arc<dyn UserRepository>) -> Router {
        create_router(AppState {
            users,
            cache: Arc::new(MemoryCache::new()),
            jwt_service: JwtService::new(test_config()),
            rate_limiter: RateLimiter::new(RateLimiterConfig {
                max_attempts: 3,
                ..RateLimiterConfig::default()
            }),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn register_neo(app: &Router) -> Value {
        let (status, body) = send(
            app,
            "POST",
            "/auth/register",
            None,
            json!({
                "email": "Neo@Example.com",
                "username": "neo",
                "password": PASSWORD,
                "confirm_password": PASSWORD,
                "first_name": "Thomas"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    #[tokio::test]
    async fn test_register_returns_user_and_tokens() {
        let app = app();
        let body = register_neo(&app).await;
        assert_eq!(body["user"]["email"], "neo@example.com");
        assert_eq!(body["user"]["first_name"], "Thomas");
        assert!(body["tokens"]["access"].is_string());
        assert!(body["tokens"]["refresh"].is_string());
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let app = app();
        register_neo(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/auth/register",
            None,
            json!({"email": "neo@example.com", "username": "other", "password": PASSWORD, "confirm_password": PASSWORD}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "POST",
            "/auth/register",
            None,
            json!({"email": "trinity@example.com", "username": "trinity", "password": PASSWORD, "confirm_password": "different"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Passwords don't match");
    }

    /// Reports every username and email as free, like a check that lost a race
    struct RacingRepository(MemoryUserRepository);

    #[async_trait]
    impl UserRepository for RacingRepository {
        async fn create(&self, new_user: &NewUser) -> anyhow::Result<User> {
            self.0.create(new_user).await
        }
        async fn find_by_username_or_email(&self, username_or_email: &str) -> anyhow::Result<Option<User>> {
            self.0.find_by_username_or_email(username_or_email).await
        }
        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            self.0.find_by_id(id).await
        }
        async fn exists(&self, _username: &str, _email: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn update_profile(&self, id: Uuid, update: &UpdateProfile) -> anyhow::Result<Option<User>> {
            self.0.update_profile(id, update).await
        }
        async fn update_password(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
            self.0.update_password(id, password_hash).await
        }
    }

    #[tokio::test]
    async fn test_register_conflict_detected_at_insert() {
        let app = app_with(Arc::new(RacingRepository(MemoryUserRepository::new())));
        register_neo(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/auth/register",
            None,
            json!({"email": "neo@example.com", "username": "the-one", "password": PASSWORD, "confirm_password": PASSWORD}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "A user with this username or email already exists");
    }

    #[tokio::test]
    async fn test_login_and_profile() {
        let app = app();
        register_neo(&app).await;

        let (status, _) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            json!({"email": "neo@example.com", "password": "wrong"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            json!({"username": "neo", "password": PASSWORD}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["tokens"]["access"].as_str().unwrap().to_string();

        let (status, profile) = send(&app, "GET", "/auth/profile", Some(&access), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "neo");

        let (status, updated) = send(
            &app,
            "PUT",
            "/auth/profile",
            Some(&access),
            json!({"bio": "The One"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["bio"], "The One");
        assert_eq!(updated["first_name"], "Thomas");
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let app = app();
        register_neo(&app).await;

        for _ in 0..3 {
            let (status, _) = send(
                &app,
                "POST",
                "/auth/login",
                None,
                json!({"email": "neo@example.com", "password": "wrong"}),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, _) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            json!({"email": "neo@example.com", "password": PASSWORD}),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_blacklists() {
        let app = app();
        let body = register_neo(&app).await;
        let refresh = body["tokens"]["refresh"].clone();

        let (status, rotated) = send(
            &app,
            "POST",
            "/auth/refresh",
            None,
            json!({"refresh": refresh}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(rotated["tokens"]["refresh"], refresh);

        // The old refresh token is spent
        let (status, _) = send(
            &app,
            "POST",
            "/auth/refresh",
            None,
            json!({"refresh_token": refresh}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Access tokens are not accepted for refresh
        let (status, _) = send(
            &app,
            "POST",
            "/auth/refresh",
            None,
            json!({"refresh_token": rotated["tokens"]["access"]}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_spends_refresh_token() {
        let app = app();
        let body = register_neo(&app).await;
        let refresh = body["tokens"]["refresh"].clone();

        let (status, _) = send(
            &app,
            "POST",
            "/auth/logout",
            None,
            json!({"refresh_token": refresh}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "POST",
            "/auth/refresh",
            None,
            json!({"refresh_token": refresh}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_password() {
        let app = app();
        let body = register_neo(&app).await;
        let access = body["tokens"]["access"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            "/auth/change-password",
            Some(&access),
            json!({"current_password": "nope", "new_password": "N3w$ecret!", "confirm_password": "N3w$ecret!"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Current password is incorrect");

        let (status, _) = send(
            &app,
            "POST",
            "/auth/change-password",
            Some(&access),
            json!({"current_password": PASSWORD, "new_password": "N3w$ecret!", "confirm_password": "N3w$ecret!"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            "POST",
            "/auth/login",
            None,
            json!({"email": "neo@example.com", "password": "N3w$ecret!"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = app();
        let (status, body) = send(&app, "GET", "/auth/profile", None, Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }
}
