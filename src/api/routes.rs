//! API Routes
//!
//! Configures the Axum router: control endpoints first, everything else is
//! proxied through the cache.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health_handler, message_handler, proxy_handler, stats_handler, AppState};

/// Creates the main router with all endpoints configured.
///
/// Only GET is routed to the proxy, so other methods on proxied paths get
/// 405 and never touch the cache.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/_cache/health", get(health_handler))
        .route("/_cache/stats", get(stats_handler))
        .route("/messages", post(message_handler))
        .route("/", get(proxy_handler))
        .route("/*path", get(proxy_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::fetch::testing::ScriptedOrigin;
    use crate::manager::ImageCacheManager;
    use crate::storage::MemoryStorage;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;
    use url::Url;

    async fn create_test_app() -> Router {
        let origin = ScriptedOrigin::new().serve("http://img.test/IMG_0001.JPG", "img");
        create_test_app_with(Arc::new(origin)).await
    }

    async fn create_test_app_with(origin: Arc<ScriptedOrigin>) -> Router {
        let config = CacheConfig {
            version: "test".to_string(),
            prefetch_radius: 0,
            ..CacheConfig::default()
        };
        let manager = ImageCacheManager::activate(Arc::new(MemoryStorage::new()), origin, config)
            .await
            .unwrap();
        create_router(AppState::new(manager, Url::parse("http://img.test/").unwrap()))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/_cache/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_proxied_image() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/IMG_0001.JPG")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "miss");
    }

    #[tokio::test]
    async fn test_scheme_relative_path_stays_on_origin() {
        let origin = Arc::new(ScriptedOrigin::new().serve("http://evil.test/secret.jpg", "x"));
        let app = create_test_app_with(origin.clone()).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("//evil.test/secret.jpg")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert!(origin.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_get_is_not_proxied() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/IMG_0001.JPG")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_bad_message() {
        let app = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"prefetchImages","url":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
