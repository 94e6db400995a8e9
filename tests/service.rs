//! End-to-end request handling with the real image backend, a directory
//! bucket and the on-disk cache.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, header};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use imgfly::cache::{DiskCache, ResponseCache};
use imgfly::imaging::{
    FetchError, RustBackend, SecondaryFetcher, SecondaryGate, Whitelist,
};
use imgfly::service::{ImageRequest, ImageService};
use imgfly::store::{FsObjectStore, ObjectStore, StoreError, StoredObject};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

struct OfflineFetcher;

#[async_trait]
impl SecondaryFetcher for OfflineFetcher {
    async fn fetch(&self, _url: &Url, _headers: &HeaderMap) -> Result<Bytes, FetchError> {
        Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE))
    }
}

/// Bucket wrapper counting reads.
struct CountingStore {
    inner: FsObjectStore,
    reads: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }
}

fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn bucket(tmp: &TempDir) -> FsObjectStore {
    let root = tmp.path().join("bucket");
    std::fs::create_dir_all(root.join("photos")).unwrap();
    std::fs::write(root.join("photos/wide.png"), gradient_png(1000, 500)).unwrap();
    std::fs::write(root.join("broken.png"), b"definitely not a png").unwrap();
    FsObjectStore::new(root)
}

fn service_with(store: Arc<dyn ObjectStore>, cache_dir: &Path) -> ImageService {
    let cache = Arc::new(DiskCache::open(cache_dir).unwrap());
    let gate = SecondaryGate::new(Whitelist::default(), Arc::new(OfflineFetcher));
    ImageService::new(store, cache, Arc::new(RustBackend::new()), gate)
}

fn get(path_and_query: &str) -> ImageRequest {
    let mut headers = HeaderMap::new();
    headers.insert(header::HOST, "img.test".parse().unwrap());
    ImageRequest::new(path_and_query, headers)
}

fn dims(body: &[u8]) -> (u32, u32) {
    image::load_from_memory(body).unwrap().dimensions()
}

// =========================================================================
// Pass-through
// =========================================================================

#[tokio::test]
async fn no_query_returns_stored_bytes() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/photos/wide.png")).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(&res.body[..], &gradient_png(1000, 500)[..]);
    assert_eq!(res.headers[header::CONTENT_TYPE], "image/png");
    assert!(res.headers.contains_key(header::ETAG));
}

#[tokio::test]
async fn upscale_returns_stored_bytes() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/photos/wide.png?w=2000")).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(&res.body[..], &gradient_png(1000, 500)[..]);
    assert!(!res.headers.contains_key(header::CACHE_CONTROL));
}

#[tokio::test]
async fn dimensions_beyond_u32_return_stored_bytes() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    for query in ["w=4294967296", "w=99999999999&h=10"] {
        let res = service
            .handle(get(&format!("/photos/wide.png?{query}")))
            .await;
        assert_eq!(res.status, StatusCode::OK, "{query}");
        assert_eq!(&res.body[..], &gradient_png(1000, 500)[..], "{query}");
    }
}

// =========================================================================
// Transforms
// =========================================================================

#[tokio::test]
async fn matching_ratio_resizes() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service
        .handle(get("/photos/wide.png?w=500&h=250&format=png"))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(dims(&res.body), (500, 250));
}

#[tokio::test]
async fn differing_ratio_covers_and_crops() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service
        .handle(get("/photos/wide.png?w=400&h=400&format=png"))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(dims(&res.body), (400, 400));
}

#[tokio::test]
async fn single_dimension_keeps_aspect() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/photos/wide.png?w=300&format=png")).await;

    assert_eq!(dims(&res.body), (300, 150));
}

#[tokio::test]
async fn output_formats_set_content_type() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    for (format, content_type, magic) in [
        ("jpeg", "image/jpeg", &b"\xFF\xD8"[..]),
        ("jpg", "image/jpeg", &b"\xFF\xD8"[..]),
        ("png", "image/png", &b"\x89PNG"[..]),
        ("webp", "image/webp", &b"RIFF"[..]),
    ] {
        let res = service
            .handle(get(&format!("/photos/wide.png?w=100&format={format}")))
            .await;
        assert_eq!(res.status, StatusCode::OK, "{format}");
        assert_eq!(res.headers[header::CONTENT_TYPE], content_type);
        assert!(res.body.starts_with(magic), "{format}");
    }
}

#[tokio::test]
async fn default_format_is_webp() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/photos/wide.png?h=100")).await;

    assert_eq!(res.headers[header::CONTENT_TYPE], "image/webp");
    assert_eq!(dims(&res.body), (200, 100));
}

// =========================================================================
// Errors
// =========================================================================

#[tokio::test]
async fn missing_key_is_404() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/photos/missing.png?w=10")).await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(&res.body[..], b"Object Not Found");
}

#[tokio::test]
async fn bad_parameters_are_400() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/photos/wide.png?w=abc")).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(&res.body[..], b"Invalid w or h");

    let res = service.handle(get("/photos/wide.png?w=10&format=gif")).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(&res.body[..], b"Invalid format");

    let res = service.handle(get("/photos/wide.png?w=10&quality=101")).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(&res.body[..], b"Invalid quality");
}

#[tokio::test]
async fn undecodable_object_is_415_with_original_bytes() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"));

    let res = service.handle(get("/broken.png?w=10")).await;

    assert_eq!(res.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(&res.body[..], b"definitely not a png");
}

#[tokio::test]
async fn unreachable_watermark_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let service = service_with(Arc::new(bucket(&tmp)), &tmp.path().join("cache"))
        .with_appended_pipeline(
            "watermark!https%3A%2F%2Fcdn.test%2Flogo.png,0,0"
                .parse()
                .unwrap(),
        );

    let res = service.handle(get("/photos/wide.png?w=100&format=png")).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(dims(&res.body), (100, 50));
}

// =========================================================================
// Caching
// =========================================================================

#[tokio::test]
async fn repeated_request_is_served_from_cache() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(CountingStore {
        inner: bucket(&tmp),
        reads: AtomicUsize::new(0),
    });
    let cache_dir = tmp.path().join("cache");
    let service = service_with(store.clone(), &cache_dir);
    let request = get("/photos/wide.png?w=250&format=png");

    let first = service.handle(request.clone()).await;
    assert_eq!(first.status, StatusCode::OK);

    // The cache write runs in the background; wait for it to land.
    let cache = DiskCache::open(&cache_dir).unwrap();
    let mut stored = None;
    for _ in 0..100 {
        stored = cache.lookup(&request.url).await.unwrap();
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored.as_ref(), Some(&first));

    let second = service.handle(request).await;
    assert_eq!(second, first);
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pass_through_is_not_cached() {
    let tmp = TempDir::new().unwrap();
    let cache_dir = tmp.path().join("cache");
    let service = service_with(Arc::new(bucket(&tmp)), &cache_dir);

    service.handle(get("/photos/wide.png")).await;
    service.handle(get("/photos/wide.png?w=5000")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 0);
}
