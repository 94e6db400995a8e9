//! The axum router built from a config file, driven with `oneshot`.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use imgfly::config::ServerConfig;
use imgfly::server::{build_service, router};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

/// Write a config file into `tmp` and load it the way the binary does.
fn setup(tmp: &TempDir, extra: &str) -> ServerConfig {
    let root = tmp.path().join("bucket");
    std::fs::create_dir_all(root.join("gallery")).unwrap();
    std::fs::write(root.join("gallery/sunset.jpg"), jpeg(640, 480)).unwrap();

    let toml = format!(
        r#"
[storage]
root = "{}"

[cache]
dir = "{}"
max_age = 3600

[defaults]
format = "jpeg"
{extra}
"#,
        root.display(),
        tmp.path().join("cache").display()
    );
    let path = tmp.path().join("imgfly.toml");
    std::fs::write(&path, toml).unwrap();
    ServerConfig::load(Some(&path)).unwrap()
}

fn app(config: &ServerConfig) -> Router {
    router(Arc::new(build_service(config).unwrap()))
}

async fn request(app: Router, method: Method, uri: &str) -> Response {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "img.test")
        .body(Body::empty())
        .unwrap();
    app.oneshot(req).await.unwrap()
}

async fn body(res: Response) -> Vec<u8> {
    to_bytes(res.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn transform_uses_configured_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "");

    let res = request(app(&config), Method::GET, "/gallery/sunset.jpg?w=320").await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(res.headers()[header::CACHE_CONTROL], "public,max-age=3600");
    let img = image::load_from_memory(&body(res).await).unwrap();
    assert_eq!(img.dimensions(), (320, 240));
}

#[tokio::test]
async fn cover_crop_to_square() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "");

    let res = request(
        app(&config),
        Method::GET,
        "/gallery/sunset.jpg?w=200&h=200&format=png",
    )
    .await;

    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    let img = image::load_from_memory(&body(res).await).unwrap();
    assert_eq!(img.dimensions(), (200, 200));
}

#[tokio::test]
async fn percent_encoded_keys_resolve() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "");
    std::fs::write(
        config.storage.root.join("gallery/late sunset.jpg"),
        jpeg(10, 10),
    )
    .unwrap();

    let res = request(app(&config), Method::GET, "/gallery/late%20sunset.jpg").await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(res).await, jpeg(10, 10));
}

#[tokio::test]
async fn unknown_key_and_traversal_are_404() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "");
    std::fs::write(tmp.path().join("secret.jpg"), jpeg(4, 4)).unwrap();

    let res = request(app(&config), Method::GET, "/gallery/nope.jpg").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(res).await, b"Object Not Found");

    let res = request(app(&config), Method::GET, "/%2E%2E/secret.jpg").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_query_is_400() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "");

    let res = request(app(&config), Method::GET, "/gallery/sunset.jpg?h=-3").await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(res).await, b"Invalid w or h");
}

#[tokio::test]
async fn only_get_is_routed() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "");

    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let res = request(app(&config), method.clone(), "/gallery/sunset.jpg").await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
    }
}

#[tokio::test]
async fn appended_crop_runs_on_every_transform() {
    let tmp = TempDir::new().unwrap();
    let config = setup(&tmp, "[pipeline]\nappend = \"crop!0,0,50,40\"");

    let res = request(
        app(&config),
        Method::GET,
        "/gallery/sunset.jpg?w=320&format=png",
    )
    .await;

    let img = image::load_from_memory(&body(res).await).unwrap();
    assert_eq!(img.dimensions(), (50, 40));
}

#[test]
fn invalid_config_is_rejected_on_load() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("imgfly.toml");
    std::fs::write(&path, "[defaults]\nquality = 150\n").unwrap();
    assert!(ServerConfig::load(Some(&path)).is_err());

    std::fs::write(&path, "[server]\nport = 80\n").unwrap();
    assert!(ServerConfig::load(Some(&path)).is_err());
}
