//! Gallery Cache - A local caching proxy for numbered gallery images
//!
//! Sits between a gallery page and its image origin.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use gallery_cache::api::{create_router, AppState};
use gallery_cache::fetch::HttpOrigin;
use gallery_cache::storage::{CacheStorage, DiskStorage, MemoryStorage};
use gallery_cache::{Config, ImageCacheManager};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open storage and activate the cache, dropping stale generations
/// 4. Precache static resources
/// 5. Serve until SIGINT/SIGTERM, then drain background work
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gallery Cache proxy");

    let config = Config::from_env();
    info!(
        "Configuration loaded: origin={}, version={}, max_image_entries={}, port={}",
        config.origin_url, config.cache_version, config.max_image_entries, config.server_port
    );

    let storage: Arc<dyn CacheStorage> = match &config.cache_dir {
        Some(dir) => {
            info!("Using disk storage at {}", dir.display());
            Arc::new(DiskStorage::new(dir.clone()).await?)
        }
        None => {
            info!("Using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    };

    let app_origin = Url::parse(&config.app_origin)
        .with_context(|| format!("invalid APP_ORIGIN {}", config.app_origin))?;
    let origin = Arc::new(HttpOrigin::new(
        app_origin,
        Duration::from_secs(config.fetch_timeout_secs),
    )?);

    let manager = ImageCacheManager::activate(storage, origin, config.cache_config()).await?;

    match manager.install(&config.precache_keys()?).await {
        Ok(count) => info!("Install complete, {} resources precached", count),
        Err(err) => warn!("Precache failed, continuing without it: {}", err),
    }

    let app = create_router(AppState::new(manager.clone(), config.origin_base()?));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Proxy listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Waiting for background refreshes and prefetches");
    manager.drain_background().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
