//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use catalog::ListingKind;
use serde_json::json;
use tracing::error;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::{AuthUser, auth_middleware},
    models::{
        DetailResponse, ListQuery, RateRequest, SaveItemRequest, SearchQuery, UserStatsResponse,
    },
};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/movies/favorites", get(list_favorites).post(add_favorite))
        .route("/movies/favorites/:id", delete(remove_favorite))
        .route("/movies/watchlist", get(list_watchlist).post(add_to_watchlist))
        .route("/movies/watchlist/:id", delete(remove_from_watchlist))
        .route("/movies/ratings", get(list_ratings))
        .route(
            "/movies/:tmdb_id/rate",
            post(create_rating).put(update_rating).delete(delete_rating),
        )
        .route("/users/stats", get(user_stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/movies", get(list_movies))
        .route("/movies/search", get(search_movies))
        .route("/movies/genres", get(list_genres))
        .route("/movies/:tmdb_id", get(movie_detail))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "api-service"
    }))
}

/// One page of a TMDB listing
pub async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let kind = ListingKind::parse(query.kind.as_deref().unwrap_or("movie"));
    let page = state.catalog.list(kind, query.page).await?;
    Ok(Json(page))
}

pub async fn search_movies(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state.catalog.search(&query.q, query.page).await?;
    Ok(Json(page))
}

pub async fn list_genres(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.genres().await?))
}

/// Item details; a valid bearer token adds the caller's flags
pub async fn movie_detail(
    State(state): State<AppState>,
    Path(tmdb_id): Path<i64>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> ApiResult<impl IntoResponse> {
    let details = state.catalog.detail(tmdb_id).await?;

    let user = bearer.and_then(|TypedHeader(auth)| state.jwt.authenticate(auth.token()).ok());
    let flags = match user {
        Some(user) => Some(state.preferences.flags(user.id, tmdb_id).await?),
        None => None,
    };

    Ok(Json(DetailResponse { details, flags }))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.preferences.list_favorites(user.id).await?))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SaveItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let saved = state
        .preferences
        .add_favorite(user.id, payload.movie_id)
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.preferences.remove_favorite(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_watchlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.preferences.list_watchlist(user.id).await?))
}

pub async fn add_to_watchlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<SaveItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let saved = state
        .preferences
        .add_to_watchlist(user.id, payload.movie_id)
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn remove_from_watchlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.preferences.remove_from_watchlist(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_ratings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.preferences.list_ratings(user.id).await?))
}

pub async fn create_rating(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(tmdb_id): Path<i64>,
    Json(payload): Json<RateRequest>,
) -> ApiResult<impl IntoResponse> {
    let rating = state
        .preferences
        .rate(user.id, tmdb_id, payload.rating, &payload.review)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

pub async fn update_rating(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(tmdb_id): Path<i64>,
    Json(payload): Json<RateRequest>,
) -> ApiResult<impl IntoResponse> {
    let rating = state
        .preferences
        .rate(user.id, tmdb_id, payload.rating, &payload.review)
        .await?;
    Ok(Json(rating))
}

pub async fn delete_rating(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(tmdb_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.preferences.remove_rating(user.id, tmdb_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Preference counts and registration month of the caller
pub async fn user_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let member_since = state
        .users
        .member_since(user.id)
        .await
        .map_err(|e| {
            error!("Failed to load user: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let counts = state.preferences.stats(user.id).await?;

    Ok(Json(UserStatsResponse {
        counts,
        member_since: member_since.format("%B %Y").to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{JwtConfig, TokenType, tests::{SECRET, token_for}};
    use crate::repositories::UserRepository;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use catalog::testing::{MemoryCatalogStore, MemoryPreferenceStore, MockProvider, fixtures};
    use catalog::{
        CatalogQueryService, CatalogSync, MovieCache, PreferenceService, SyncConfig, SyncQueue,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use common::cache::MemoryCache;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct FixedUsers {
        id: Uuid,
    }

    #[async_trait]
    impl UserRepository for FixedUsers {
        async fn member_since(&self, user_id: Uuid) -> anyhow::Result<Option<DateTime<Utc>>> {
            if user_id == self.id {
                Ok(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single())
            } else {
                Ok(None)
            }
        }
    }

    struct TestApp {
        router: Router,
        provider: Arc<MockProvider>,
        user: Uuid,
    }

    fn test_app() -> TestApp {
        let provider = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryCatalogStore::new());
        let cache = MovieCache::new(Arc::new(MemoryCache::new()));
        let queue = SyncQueue::start(CatalogSync::new(store.clone()), &SyncConfig::default());
        let user = Uuid::new_v4();

        let state = AppState {
            catalog: CatalogQueryService::new(
                provider.clone(),
                store.clone(),
                cache.clone(),
                queue.handle(),
            ),
            preferences: PreferenceService::new(
                Arc::new(MemoryPreferenceStore::new(store.clone())),
                store,
                cache,
            ),
            users: Arc::new(FixedUsers { id: user }),
            jwt: JwtConfig {
                secret: SECRET.to_string(),
            },
        };

        TestApp {
            router: create_router(state),
            provider,
            user,
        }
    }

    impl TestApp {
        fn bearer(&self) -> String {
            format!("Bearer {}", token_for(self.user, TokenType::Access, 900))
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        async fn get(&self, uri: &str, auth: bool) -> (StatusCode, Value) {
            let mut builder = Request::builder().uri(uri);
            if auth {
                builder = builder.header(header::AUTHORIZATION, self.bearer());
            }
            self.send(builder.body(Body::empty()).unwrap()).await
        }

        async fn write(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, self.bearer())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.get("/health", false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_trending() {
        let app = test_app();
        app.provider
            .set_listing(
                ListingKind::Trending,
                fixtures::provider_page(1, &[(603, "The Matrix"), (550, "Fight Club")]),
            )
            .await;

        let (status, body) = app.get("/movies?type=trending&page=1", false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "tmdb");
        assert_eq!(body["results"][0]["tmdb_id"], 603);
        assert_eq!(body["results"][1]["title"], "Fight Club");
        assert_eq!(body["page"], 1);
    }

    #[tokio::test]
    async fn test_provider_outage_serves_local_source() {
        let app = test_app();
        app.provider.fail_with_unavailable().await;

        let (status, body) = app.get("/movies", false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "local");
        assert!(body["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_search() {
        let app = test_app();
        let (status, body) = app.get("/movies/search?q=", false).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["results"].as_array().unwrap().is_empty());
        assert_eq!(app.provider.search_calls().await, 0);
    }

    #[tokio::test]
    async fn test_genres() {
        let app = test_app();
        let (status, body) = app.get("/movies/genres", false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["genres"][0]["name"], "Action");
    }

    #[tokio::test]
    async fn test_detail_unknown_is_404() {
        let app = test_app();
        let (status, body) = app.get("/movies/550", false).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_detail_flags_only_with_token() {
        let app = test_app();
        app.provider
            .set_details(550, fixtures::details(550, "Fight Club"))
            .await;

        let (status, body) = app.get("/movies/550", false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Fight Club");
        assert_eq!(body["runtime"], 139);
        assert!(body.get("is_favorite").is_none());

        let (status, _) = app
            .write("POST", "/movies/favorites", json!({"movie_id": 550}))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = app.get("/movies/550", true).await;
        assert_eq!(body["is_favorite"], true);
        assert_eq!(body["is_watchlisted"], false);
        assert!(body["user_rating"].is_null());
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = test_app();
        for uri in ["/movies/favorites", "/movies/watchlist", "/movies/ratings", "/users/stats"] {
            let (status, body) = app.get(uri, false).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["error"], "Unauthorized");
        }
    }

    #[tokio::test]
    async fn test_watchlist_add_list_remove() {
        let app = test_app();
        let (status, saved) = app
            .write("POST", "/movies/watchlist", json!({"movie_id": 424242}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved["movie"]["title"], "Movie 424242");

        let (_, listed) = app.get("/movies/watchlist", true).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let uri = format!("/movies/watchlist/{}", saved["id"]);
        let (status, _) = app.write("DELETE", &uri, Value::Null).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.write("DELETE", &uri, Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_movie_id_is_400() {
        let app = test_app();
        let (status, _) = app
            .write("POST", "/movies/favorites", json!({"movie_id": -5}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rating_lifecycle() {
        let app = test_app();

        let (status, _) = app
            .write("POST", "/movies/550/rate", json!({"rating": 6}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, created) = app
            .write("POST", "/movies/550/rate", json!({"rating": 4, "review": "solid"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["rating"], 4);

        let (status, updated) = app
            .write("PUT", "/movies/550/rate", json!({"rating": 5}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["id"], created["id"]);
        assert_eq!(updated["review"], "");

        let (_, ratings) = app.get("/movies/ratings", true).await;
        assert_eq!(ratings.as_array().unwrap().len(), 1);

        let (status, _) = app.write("DELETE", "/movies/550/rate", Value::Null).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_user_stats() {
        let app = test_app();
        app.write("POST", "/movies/favorites", json!({"movie_id": 550}))
            .await;
        app.write("POST", "/movies/550/rate", json!({"rating": 3}))
            .await;

        let (status, body) = app.get("/users/stats", true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["favorites_count"], 1);
        assert_eq!(body["watchlist_count"], 0);
        assert_eq!(body["ratings_count"], 1);
        assert_eq!(body["member_since"], "June 2024");
    }
}
