//! Shared test utilities.
//!
//! In-memory stand-ins for the bucket and the secondary-image fetcher, plus
//! small generated images for codec tests.
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let store = MemoryStore::new().with_object("cat.png", &png_bytes(64, 32));
//! let fetcher = StaticFetcher::new().with_status("https://a.test/gone.png", 404);
//! ```

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use url::Url;

use crate::imaging::{FetchError, SecondaryFetcher};
use crate::store::{ObjectStore, StoreError, StoredObject};

// =========================================================================
// Images
// =========================================================================

/// A `width` x `height` image of alternating red and blue pixels.
pub fn checkerboard(width: u32, height: u32) -> DynamicImage {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });
    DynamicImage::ImageRgba8(img)
}

/// [`checkerboard`] encoded as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    checkerboard(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

// =========================================================================
// Object store
// =========================================================================

/// Bucket held in a map. Can be switched to fail every read.
#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<String, Bytes>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, key: &str, body: &[u8]) -> Self {
        self.objects
            .insert(key.to_string(), Bytes::copy_from_slice(body));
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        if self.failing {
            return Err(StoreError::Io(std::io::Error::other("bucket offline")));
        }
        Ok(self
            .objects
            .get(key)
            .map(|body| StoredObject::new(key, body.clone())))
    }
}

// =========================================================================
// Secondary fetcher
// =========================================================================

enum Canned {
    Image(Bytes),
    Status(StatusCode),
}

/// Fetcher that answers from a fixed table and records every call.
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Canned>,
    calls: Mutex<Vec<(String, HeaderMap)>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a small PNG at `url`.
    pub fn with_image(mut self, url: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            Canned::Image(Bytes::from(png_bytes(4, 4))),
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.responses
            .insert(url.to_string(), Canned::Status(status));
        self
    }

    /// URLs fetched so far, with the headers that were passed along.
    pub fn calls(&self) -> Vec<(String, HeaderMap)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecondaryFetcher for StaticFetcher {
    async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), headers.clone()));
        match self.responses.get(url.as_str()) {
            Some(Canned::Image(bytes)) => Ok(bytes.clone()),
            Some(Canned::Status(status)) => Err(FetchError::Status(*status)),
            None => Err(FetchError::Status(StatusCode::NOT_FOUND)),
        }
    }
}
