//! Object storage gateway.
//!
//! Source images live in a bucket addressed by key. The service only needs a
//! single `get`, so the gateway is a small async trait; [`FsObjectStore`]
//! maps keys onto files below a root directory.
//!
//! ## Metadata
//!
//! Stored objects carry the HTTP metadata used on pass-through responses:
//!
//! - **`content-type`**: guessed from the key's extension.
//! - **`etag`**: quoted SHA-256 of the object body, so it changes exactly
//!   when the bytes do.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, header};
use bytes::Bytes;
use image::ImageFormat;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A fetched object with its HTTP metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub etag: String,
}

impl StoredObject {
    /// Build an object from its key and body, deriving the metadata.
    pub fn new(key: &str, body: Bytes) -> Self {
        let content_type = ImageFormat::from_path(key)
            .ok()
            .map(|format| format.to_mime_type().to_string());
        let etag = format!("\"{:x}\"", Sha256::digest(&body));
        Self {
            body,
            content_type,
            etag,
        }
    }

    /// Headers describing this object (`content-type`, `etag`).
    pub fn http_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.etag) {
            headers.insert(header::ETAG, value);
        }
        headers
    }
}

/// Read access to the source bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;
}

/// Bucket backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path below the root, or `None` if the key could
    /// escape it.
    fn resolve(&self, key: &str) -> Option<PathBuf> {
        if key.is_empty() || key.contains('\\') || key.contains('\0') {
            return None;
        }
        let relative = Path::new(key);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let Some(path) = self.resolve(key) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(StoredObject::new(key, Bytes::from(bytes)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            // A directory where an object was expected is a miss, not a fault.
            Err(_) if path.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
