//! API Handlers
//!
//! Translates HTTP requests into cache manager calls and manager responses
//! back into HTTP.

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use url::Url;

use crate::cache::ResourceKey;
use crate::error::{CacheError, Result};
use crate::manager::{
    CacheResponse, Destination, ImageCacheManager, InterceptedRequest, ResponseSource,
};
use crate::models::{ClientMessage, HealthResponse, MessageResponse, StatsResponse};

/// Header set on placeholder responses.
pub const FALLBACK_HEADER: &str = "x-fallback";
/// Header naming where a proxied response came from.
pub const CACHE_SOURCE_HEADER: &str = "x-cache";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The cache manager
    pub manager: ImageCacheManager,
    /// Origin base URL that request paths are resolved against
    pub origin_base: Url,
}

impl AppState {
    /// Creates a new AppState.
    pub fn new(manager: ImageCacheManager, origin_base: Url) -> Self {
        Self {
            manager,
            origin_base,
        }
    }
}

fn destination(headers: &HeaderMap) -> Destination {
    match headers.get("sec-fetch-dest").and_then(|v| v.to_str().ok()) {
        Some("image") => Destination::Image,
        _ => Destination::Other,
    }
}

/// Handler for GET on every proxied path
///
/// Resolves the request path and query against the origin base and lets the
/// manager answer it.
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Response> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let request = InterceptedRequest {
        method,
        key: ResourceKey::resolve(&state.origin_base, path)?,
        destination: destination(&headers),
    };

    match state.manager.handle(&request).await? {
        Some(response) => Ok(response.into_response()),
        None => Err(CacheError::InvalidRequest(format!(
            "{} requests are not proxied",
            request.method
        ))),
    }
}

/// Handler for POST /messages
///
/// Accepts a client message; the work it triggers runs in the background.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<ClientMessage>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    if let Some(error_msg) = message.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.manager.handle_message(message)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::accepted("prefetch scheduled")),
    ))
}

/// Handler for GET /_cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.manager.stats().await?;
    let config = state.manager.config();

    Ok(Json(StatsResponse::new(
        config.version.clone(),
        config.max_image_entries,
        &stats,
    )))
}

/// Handler for GET /_cache/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

impl ResponseSource {
    fn as_header(self) -> &'static str {
        match self {
            ResponseSource::Hit => "hit",
            ResponseSource::Miss => "miss",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Network => "network",
            ResponseSource::StaticCache => "static",
        }
    }
}

impl IntoResponse for CacheResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = Response::new(Body::from_stream(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(
            CACHE_SOURCE_HEADER,
            HeaderValue::from_static(self.source.as_header()),
        );
        if self.source == ResponseSource::Fallback {
            headers.insert(FALLBACK_HEADER, HeaderValue::from_static("true"));
        }
        response
    }
}
