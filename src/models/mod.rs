//! Request and Response models for the proxy's own endpoints
//!
//! Proxied traffic carries origin bodies untouched; these DTOs only cover
//! the control surface under `/_cache` and the client message channel.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::ClientMessage;
pub use responses::{ErrorResponse, HealthResponse, MessageResponse, StatsResponse};
