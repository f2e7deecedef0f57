//! API Module
//!
//! HTTP handlers and routing for the caching proxy.
//!
//! # Endpoints
//! - `GET /_cache/health` - Health check endpoint
//! - `GET /_cache/stats` - Cache statistics
//! - `POST /messages` - Client messages such as prefetch hints
//! - `GET /*path` - Proxied through the cache to the origin

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
