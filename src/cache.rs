//! Response cache for transformed images.
//!
//! Resizing and encoding are the expensive part of a request, and the same
//! URL always produces the same bytes. This module lets the service answer a
//! repeated request without touching the bucket or the image pipeline.
//!
//! # Design
//!
//! Only successful transform responses are stored. Pass-through responses
//! (the stored object returned as-is) and error responses never are, so a
//! fixed source object or a configuration change is picked up on the next
//! request for any URL that previously failed.
//!
//! ## Cache keys
//!
//! Entries are keyed by the full request URL, query included. On disk the
//! key is hashed with SHA-256 to get a filesystem-safe name; the original key
//! is stored inside the entry and compared on lookup, so a hash collision
//! reads as a miss rather than the wrong image.
//!
//! ## Storage
//!
//! [`DiskCache`] writes two files per entry into its directory:
//!
//! ```text
//! <dir>/<sha256(key)>.json   # CacheEntry: version, key, status, headers
//! <dir>/<sha256(key)>.bin    # response body
//! ```
//!
//! Each write goes to its own uniquely named temporary file in the cache
//! directory and is renamed into place, body first, so concurrent writers of
//! one key never share a file and a reader sees either a complete entry or
//! none. Unreadable,
//! corrupt or version-mismatched entries are treated as misses.
//!
//! ## Writes are fire-and-forget
//!
//! The service spawns the store call after the response is built; the client
//! never waits for the cache write, and a failed write is only logged.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Version of the on-disk entry format. Bump this to invalidate all
/// existing entries when the format changes.
const ENTRY_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache writer failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A complete response as it was sent to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Cache gateway.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up a response by request URL.
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>, CacheError>;

    /// Store a response under its request URL, replacing any previous entry.
    async fn store(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError>;
}

/// Cache that never hits. Used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl ResponseCache for NoCache {
    async fn lookup(&self, _key: &str) -> Result<Option<CachedResponse>, CacheError> {
        Ok(None)
    }

    async fn store(&self, _key: &str, _response: &CachedResponse) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Metadata half of an on-disk entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub version: u32,
    pub key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl CacheEntry {
    fn from_response(key: &str, response: &CachedResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Self {
            version: ENTRY_VERSION,
            key: key.to_string(),
            status: response.status.as_u16(),
            headers,
        }
    }

    /// Rebuild the response, or `None` if the entry is not usable.
    fn into_response(self, body: Bytes) -> Option<CachedResponse> {
        let status = StatusCode::from_u16(self.status).ok()?;
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_str(&value).ok()?;
            headers.append(name, value);
        }
        Some(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

/// SHA-256 of a cache key, returned as a hex string.
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Response cache stored as files in a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open (and create if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let stem = hash_key(key);
        (
            self.dir.join(format!("{stem}.json")),
            self.dir.join(format!("{stem}.bin")),
        )
    }
}

/// Write `contents` to a fresh temporary file in `dir`, then rename it over
/// `path`.
fn write_atomic(dir: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path)?;
    Ok(())
}

#[async_trait]
impl ResponseCache for DiskCache {
    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let (meta_path, body_path) = self.paths(key);
        let meta = match tokio::fs::read(&meta_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = match serde_json::from_slice(&meta) {
            Ok(entry) => entry,
            Err(_) => return Ok(None),
        };
        if entry.version != ENTRY_VERSION || entry.key != key {
            return Ok(None);
        }
        let body = match tokio::fs::read(&body_path).await {
            Ok(b) => Bytes::from(b),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(entry.into_response(body))
    }

    async fn store(&self, key: &str, response: &CachedResponse) -> Result<(), CacheError> {
        let (meta_path, body_path) = self.paths(key);
        let entry = CacheEntry::from_response(key, response);
        let json = serde_json::to_vec_pretty(&entry)?;
        let dir = self.dir.clone();
        let body = response.body.clone();
        tokio::task::spawn_blocking(move || {
            write_atomic(&dir, &body_path, &body)?;
            write_atomic(&dir, &meta_path, &json)
        })
        .await??;
        Ok(())
    }
}
