//! HTTP front end.
//!
//! Every `GET` path is an object key; the router hands the request to
//! [`ImageService::handle`] and turns the result back into an HTTP response.
//! Other methods get axum's `405`.

use crate::cache::{DiskCache, NoCache, ResponseCache};
use crate::config::{ConfigError, ServerConfig};
use crate::imaging::{HttpFetcher, RustBackend, SecondaryGate};
use crate::service::{ImageRequest, ImageResponse, ImageService};
use crate::store::FsObjectStore;
use axum::Router;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("invalid bind address '{0}'")]
    Bind(String),
}

/// Wire the production gateways together from config.
pub fn build_service(config: &ServerConfig) -> Result<ImageService, ServeError> {
    let store = Arc::new(FsObjectStore::new(&config.storage.root));
    let cache: Arc<dyn ResponseCache> = if config.cache.enabled {
        Arc::new(DiskCache::open(&config.cache.dir)?)
    } else {
        Arc::new(NoCache)
    };
    // No request timeout; a slow secondary fetch delays the response.
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let gate = SecondaryGate::new(config.whitelist(), Arc::new(HttpFetcher::new(client)));

    Ok(
        ImageService::new(store, cache, Arc::new(RustBackend::new()), gate)
            .with_defaults(config.request_defaults())
            .with_appended_pipeline(config.append_pipeline()?)
            .with_cache_control(&config.cache_control()),
    )
}

pub fn router(service: Arc<ImageService>) -> Router {
    Router::new()
        .route("/", get(serve_image))
        .route("/{*key}", get(serve_image))
        .with_state(service)
}

async fn serve_image(State(service): State<Arc<ImageService>>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let request = ImageRequest::new(path_and_query, parts.headers);
    into_http(service.handle(request).await)
}

fn into_http(response: ImageResponse) -> Response {
    (response.status, response.headers, response.body).into_response()
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: &ServerConfig) -> Result<(), ServeError> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|_| ServeError::Bind(config.server.bind.clone()))?;
    let service = Arc::new(build_service(config)?);

    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        root = %config.storage.root.display(),
        cache = config.cache.enabled,
        "listening"
    );
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
