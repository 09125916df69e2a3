use crate::config::{Config, Listener as ListenerConfig};
use crate::errors::{
    FieldError, RateLimitExceeded, UpstreamError, UpstreamErrorKind, ValidationError,
};
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::response_cache::ResponseCache;
use crate::service::GameStatsService;
use crate::types::AppId;
use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiServeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("could not serialize response: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A successful aggregation response, already serialized.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Bytes,
    pub cache_hit: bool,
    pub rate_limit: RateLimitDecision,
}

struct ValidatedGamesRequest {
    steam_id: String,
    include_achievements: bool,
}

fn validate_steam_id(steam_id: &str, errors: &mut Vec<FieldError>) {
    if steam_id.len() != 17 || !steam_id.bytes().all(|b| b.is_ascii_digit()) {
        errors.push(FieldError {
            field: "steamId",
            message: "must be a 17 digit SteamID64".into(),
        });
    }
}

fn validate_app_id(app_id: &str, errors: &mut Vec<FieldError>) -> Option<AppId> {
    match app_id.parse::<AppId>() {
        Ok(id) if id > 0 => Some(id),
        _ => {
            errors.push(FieldError {
                field: "appId",
                message: "must be a positive integer".into(),
            });
            None
        }
    }
}

fn validate_games_request(
    steam_id: &str,
    query: &BTreeMap<String, String>,
) -> Result<ValidatedGamesRequest, ValidationError> {
    let mut errors = Vec::new();
    validate_steam_id(steam_id, &mut errors);

    let include_achievements = match query.get("includeAchievements").map(String::as_str) {
        None | Some("false") => false,
        Some("true") => true,
        Some(_) => {
            errors.push(FieldError {
                field: "includeAchievements",
                message: "must be true or false".into(),
            });
            false
        }
    };

    if !errors.is_empty() {
        return Err(ValidationError { errors });
    }

    Ok(ValidatedGamesRequest {
        steam_id: steam_id.to_string(),
        include_achievements,
    })
}

fn validate_achievements_request(
    steam_id: &str,
    app_id: &str,
) -> Result<AppId, ValidationError> {
    let mut errors = Vec::new();
    validate_steam_id(steam_id, &mut errors);
    let app_id = validate_app_id(app_id, &mut errors);

    match app_id {
        Some(app_id) if errors.is_empty() => Ok(app_id),
        _ => Err(ValidationError { errors }),
    }
}

/// Entry points guarded by the rate limiters and fronted by the response cache.
pub struct Api {
    service: GameStatsService,
    response_cache: ResponseCache,
    games_limiter: RateLimiter,
    achievements_limiter: RateLimiter,
    games_ttl: Duration,
    achievements_ttl: Duration,
}

impl Api {
    pub fn new(config: &Config, service: GameStatsService) -> Self {
        let cache = &config.response_cache;
        let limits = &config.rate_limits;
        Api {
            service,
            response_cache: ResponseCache::new(
                cache.capacity,
                Duration::from_secs(cache.default_ttl_secs),
            ),
            games_limiter: RateLimiter::new(
                "games",
                limits.games.max_requests,
                limits.games.window(),
            ),
            achievements_limiter: RateLimiter::new(
                "achievements",
                limits.achievements.max_requests,
                limits.achievements.window(),
            ),
            games_ttl: Duration::from_secs(cache.games_ttl_secs),
            achievements_ttl: Duration::from_secs(cache.achievements_ttl_secs),
        }
    }

    pub async fn user_games(
        &self,
        client: &str,
        steam_id: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<ApiResponse, ApiError> {
        let rate_limit = self.games_limiter.admit(client)?;
        let request = validate_games_request(steam_id, query)?;

        let key = ResponseCache::request_key(&format!("/api/users/{steam_id}/games"), query);
        if let Some(body) = self.response_cache.get(&key) {
            return Ok(ApiResponse {
                body,
                cache_hit: true,
                rate_limit,
            });
        }

        let games = self
            .service
            .get_user_games(&request.steam_id, request.include_achievements)
            .await?;
        let body = Bytes::from(serde_json::to_vec(&games)?);
        self.response_cache
            .set(key, body.clone(), Some(self.games_ttl));

        Ok(ApiResponse {
            body,
            cache_hit: false,
            rate_limit,
        })
    }

    pub async fn game_achievements(
        &self,
        client: &str,
        steam_id: &str,
        app_id: &str,
    ) -> Result<ApiResponse, ApiError> {
        let rate_limit = self.achievements_limiter.admit(client)?;
        let app_id = validate_achievements_request(steam_id, app_id)?;

        let key = ResponseCache::request_key(
            &format!("/api/users/{steam_id}/games/{app_id}/achievements"),
            &BTreeMap::new(),
        );
        if let Some(body) = self.response_cache.get(&key) {
            return Ok(ApiResponse {
                body,
                cache_hit: true,
                rate_limit,
            });
        }

        let achievements = self.service.get_game_achievements(steam_id, app_id).await?;
        let body = Bytes::from(serde_json::to_vec(&achievements)?);
        self.response_cache
            .set(key, body.clone(), Some(self.achievements_ttl));

        Ok(ApiResponse {
            body,
            cache_hit: false,
            rate_limit,
        })
    }
}

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

fn rate_limit_headers(limit: u32, remaining: u32, reset_secs: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_secs));
    headers
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut headers = rate_limit_headers(
            self.rate_limit.limit,
            self.rate_limit.remaining,
            self.rate_limit.reset_secs(),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            X_CACHE,
            HeaderValue::from_static(if self.cache_hit { "HIT" } else { "MISS" }),
        );

        (StatusCode::OK, headers, self.body).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorResponse {
    error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_kind: Option<UpstreamErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ApiErrorResponse {
    fn new(message: String) -> Self {
        ApiErrorResponse {
            error_message: message,
            details: None,
            upstream_kind: None,
            upstream_code: None,
            retry_after: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = ApiErrorResponse::new(self.to_string());
        let mut headers = HeaderMap::new();

        let status = match self {
            ApiError::Validation(e) => {
                body.details = Some(e.errors);
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimited(e) => {
                headers = rate_limit_headers(e.limit, 0, e.retry_after_secs);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(e.retry_after_secs));
                body.retry_after = Some(e.retry_after_secs);
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Upstream(e) => {
                body.upstream_kind = Some(e.kind);
                body.upstream_code = e.code;
                match e.kind {
                    UpstreamErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
                    UpstreamErrorKind::Http | UpstreamErrorKind::Unexpected => {
                        StatusCode::BAD_GATEWAY
                    }
                }
            }
            ApiError::Serialization(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, headers, Json(body)).into_response()
    }
}

/// Rate limiting key for the caller. Falls back to a shared bucket when the
/// peer address is not available.
pub struct ClientKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientKey(key))
    }
}

async fn user_games_handler(
    State(api): State<Arc<Api>>,
    ClientKey(client): ClientKey,
    Path(steam_id): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<ApiResponse, ApiError> {
    api.user_games(&client, &steam_id, &query).await
}

async fn game_achievements_handler(
    State(api): State<Arc<Api>>,
    ClientKey(client): ClientKey,
    Path((steam_id, app_id)): Path<(String, String)>,
) -> Result<ApiResponse, ApiError> {
    api.game_achievements(&client, &steam_id, &app_id).await
}

async fn health_handler() -> &'static str {
    "ok\n"
}

pub fn router(api: Arc<Api>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/users/{steam_id}/games", get(user_games_handler))
        .route(
            "/api/users/{steam_id}/games/{app_id}/achievements",
            get(game_achievements_handler),
        )
        .with_state(api)
}

pub async fn serve(listener: &ListenerConfig, api: Arc<Api>) -> Result<(), ApiServeError> {
    let app = router(api);
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
