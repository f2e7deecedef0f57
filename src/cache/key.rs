//! Resource Keys
//!
//! Normalized absolute URLs identifying cacheable resources.

use std::fmt;

use url::Url;

use crate::error::{CacheError, Result};

/// A normalized absolute http(s) URL.
///
/// Parsing normalizes scheme and host case, default ports and dot segments;
/// fragments are dropped since they never reach the origin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(Url);

impl ResourceKey {
    /// Parses an absolute URL into a key.
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_url(Url::parse(input)?)
    }

    /// Resolves a path (with optional query) against a base URL.
    ///
    /// The result must stay on the base's origin; scheme-relative (`//host`)
    /// and absolute references to other hosts are rejected.
    pub fn resolve(base: &Url, path_and_query: &str) -> Result<Self> {
        let url = base.join(path_and_query)?;
        if url.origin() != base.origin() {
            return Err(CacheError::InvalidKey(format!(
                "{} leaves origin {}",
                path_and_query,
                base.origin().ascii_serialization()
            )));
        }
        Self::from_url(url)
    }

    /// Wraps an already parsed URL.
    pub fn from_url(mut url: Url) -> Result<Self> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CacheError::InvalidKey(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                url
            )));
        }
        url.set_fragment(None);
        Ok(Self(url))
    }

    /// The key in its serialized form.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The underlying URL.
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Last path segment, empty for directory URLs.
    pub fn file_name(&self) -> &str {
        self.0
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("")
    }

    /// Returns a copy of this key with the last path segment replaced.
    ///
    /// `file_name` is taken in its encoded form, as [`file_name`] returns it,
    /// so existing percent escapes are kept rather than escaped again.
    ///
    /// [`file_name`]: ResourceKey::file_name
    pub fn with_file_name(&self, file_name: &str) -> Result<Self> {
        if self.0.cannot_be_a_base() {
            return Err(CacheError::InvalidKey(format!("{} has no path", self.0)));
        }
        let mut url = self.0.clone();
        let path = {
            let current = url.path();
            let dir = current.rfind('/').map_or("/", |i| &current[..=i]);
            format!("{}{}", dir, file_name)
        };
        url.set_path(&path);
        Self::from_url(url)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
