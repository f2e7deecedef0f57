//! Filesystem storage backend.
//!
//! Each store is a directory under the storage root. An entry is two files
//! named after the SHA-256 of its key: `<hash>.body` with the payload and
//! `<hash>.json` with the key, content type and timestamp. Both are written
//! to a temp file first and renamed into place, body before header, so a
//! reader never sees a header pointing at a partial body.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::body::BodyStream;
use crate::cache::{current_timestamp_ms, CacheEntry};
use crate::error::{CacheError, Result};
use crate::storage::{CacheStorage, Store};

/// Stores persisted as directories on disk.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Uses `root` as the storage directory, creating it if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn store_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CacheError::InvalidRequest(format!(
                "invalid store name '{}'",
                name
            )));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>> {
        let dir = self.store_dir(name)?;
        fs::create_dir_all(&dir).await?;
        let store: Arc<dyn Store> = Arc::new(DiskStore::new(dir));
        Ok(store)
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            if item.file_type().await?.is_dir() {
                if let Some(name) = item.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let dir = self.store_dir(name)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    key: String,
    content_type: Option<String>,
    stored_at: u64,
}

/// A single store directory.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskStore {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        }
    }

    fn stem(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        digest.iter().fold(String::with_capacity(64), |mut acc, b| {
            acc.push_str(&format!("{:02x}", b));
            acc
        })
    }

    fn body_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.body", stem))
    }

    fn header_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.json", stem))
    }

    fn tmp_path(&self, stem: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}.{}.tmp", stem, n))
    }

    async fn read_header(path: &Path) -> Result<Option<EntryHeader>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_body(&self, path: &Path, key: &str, mut body: BodyStream) -> Result<()> {
        let mut file = fs::File::create(path).await?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                CacheError::Upstream(format!("body for {} ended early: {}", key, err))
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let stem = Self::stem(key);
        let header = match Self::read_header(&self.header_path(&stem)).await? {
            Some(header) if header.key == key => header,
            _ => return Ok(None),
        };

        match fs::read(self.body_path(&stem)).await {
            Ok(raw) => Ok(Some(CacheEntry {
                key: header.key,
                body: Bytes::from(raw),
                content_type: header.content_type,
                stored_at: header.stored_at,
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let stem = Self::stem(key);
        Ok(Self::read_header(&self.header_path(&stem))
            .await?
            .is_some_and(|header| header.key == key))
    }

    async fn put(&self, key: &str, content_type: Option<String>, body: BodyStream) -> Result<()> {
        let stem = Self::stem(key);

        let body_tmp = self.tmp_path(&stem);
        if let Err(err) = self.write_body(&body_tmp, key, body).await {
            if let Err(cleanup) = fs::remove_file(&body_tmp).await {
                warn!("Failed to remove temp file {:?}: {}", body_tmp, cleanup);
            }
            return Err(err);
        }
        fs::rename(&body_tmp, self.body_path(&stem)).await?;

        let header = EntryHeader {
            key: key.to_string(),
            content_type,
            stored_at: current_timestamp_ms(),
        };
        let header_tmp = self.tmp_path(&stem);
        fs::write(&header_tmp, serde_json::to_vec(&header)?).await?;
        fs::rename(&header_tmp, self.header_path(&stem)).await?;

        debug!("Stored {} in {:?}", key, self.dir);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_header(&path).await {
                Ok(Some(header)) => keys.push(header.key),
                Ok(None) => {}
                Err(err) => warn!("Skipping unreadable entry header {:?}: {}", path, err),
            }
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let stem = Self::stem(key);
        let existed = match fs::remove_file(self.header_path(&stem)).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => return Err(err.into()),
        };
        match fs::remove_file(self.body_path(&stem)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(existed)
    }
}
