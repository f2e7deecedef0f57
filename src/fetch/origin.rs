//! Origin Port
//!
//! The origin is an unreliable byte provider. [`OriginFetch`] is the seam the
//! cache talks to; [`HttpOrigin`] implements it over reqwest with browser-like
//! request modes so cross-origin images behave the way they would in a page.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::body::{self, BodyStream};
use crate::error::{CacheError, Result};

// == Request Mode ==
/// How a request treats cross-origin responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Cross-origin responses must carry a matching `Access-Control-Allow-Origin`.
    Cors,
    /// Cross-origin responses are accepted but opaque.
    NoCors,
}

// == Response Kind ==
/// Visibility of a response to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    /// Cross-origin response allowed by CORS.
    Cors,
    /// Cross-origin no-cors response; the status cannot be inspected.
    Opaque,
}

// == Origin Response ==
/// A response from the origin with a streaming body.
pub struct OriginResponse {
    /// HTTP status, 0 for opaque responses
    pub status: u16,
    /// Response visibility
    pub kind: ResponseKind,
    /// `Content-Type` header, if present
    pub content_type: Option<String>,
    /// Response body
    pub body: BodyStream,
}

impl OriginResponse {
    /// Builds a response with a complete in-memory body.
    pub fn from_bytes(
        status: u16,
        kind: ResponseKind,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            kind,
            content_type,
            body: body::full(bytes),
        }
    }

    /// True for a readable 2xx response.
    pub fn ok(&self) -> bool {
        self.kind != ResponseKind::Opaque && (200..300).contains(&self.status)
    }

    /// True when the status cannot be inspected.
    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    /// Successful, or opaque and therefore presumed successful.
    pub fn is_acceptable(&self) -> bool {
        self.ok() || self.is_opaque()
    }
}

impl fmt::Debug for OriginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginResponse")
            .field("status", &self.status)
            .field("kind", &self.kind)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

// == Fetch Error ==
/// A failed origin request.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS or timeout failure
    #[error("network error: {0}")]
    Network(String),

    /// Cross-origin response without a matching allow-origin header
    #[error("CORS check failed for {0}")]
    Cors(String),
}

// == Origin Fetch ==
/// Retrieves resources from the origin.
#[async_trait]
pub trait OriginFetch: Send + Sync {
    /// Performs a credential-less GET of `url` in the given mode.
    async fn fetch(&self, url: &Url, mode: FetchMode) -> std::result::Result<OriginResponse, FetchError>;
}

// == HTTP Origin ==
/// [`OriginFetch`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
    app_origin: Url,
}

impl HttpOrigin {
    /// Creates a client that fetches on behalf of pages served from `app_origin`.
    pub fn new(app_origin: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gallery-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CacheError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, app_origin })
    }

    fn allows(&self, header: Option<&str>) -> bool {
        match header {
            Some("*") => true,
            Some(value) => value == self.app_origin.origin().ascii_serialization(),
            None => false,
        }
    }
}

#[async_trait]
impl OriginFetch for HttpOrigin {
    async fn fetch(&self, url: &Url, mode: FetchMode) -> std::result::Result<OriginResponse, FetchError> {
        let same_origin = url.origin() == self.app_origin.origin();

        // reqwest never attaches cookies without a cookie store, so
        // credentials are always omitted.
        let mut request = self.client.get(url.clone());
        if mode == FetchMode::Cors && !same_origin {
            request = request.header(ORIGIN, self.app_origin.origin().ascii_serialization());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let (status, kind) = if same_origin {
            (response.status().as_u16(), ResponseKind::Basic)
        } else {
            match mode {
                FetchMode::Cors => {
                    let allow = headers
                        .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                        .and_then(|v| v.to_str().ok());
                    if !self.allows(allow) {
                        return Err(FetchError::Cors(url.to_string()));
                    }
                    (response.status().as_u16(), ResponseKind::Cors)
                }
                FetchMode::NoCors => (0, ResponseKind::Opaque),
            }
        };

        let body: BodyStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(std::io::Error::other)),
        );

        Ok(OriginResponse {
            status,
            kind,
            content_type,
            body,
        })
    }
}
