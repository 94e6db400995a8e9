//! Request handling: cache → bucket → validate → transform → encode.
//!
//! [`ImageService::handle`] is transport-agnostic; the axum layer in
//! [`server`](crate::server) only converts to and from HTTP types.
//!
//! ## Responses
//!
//! | Situation | Status | Body |
//! |---|---|---|
//! | Cache hit | as cached | as cached |
//! | Key not in bucket | 404 | `Object Not Found` |
//! | Bad `w`/`h`/`format`/`quality` | 400 | error message |
//! | No resize, or upscale requested | 200 | stored bytes + store metadata |
//! | Transformed | 200 | encoded bytes, `content-type`, `cache-control` |
//! | Decode/transform/encode failure | 415 | stored bytes |
//! | Anything else | 500 | stored bytes (empty if the bucket failed) |
//!
//! Only transformed 200 responses are cached.

use crate::cache::{CachedResponse, ResponseCache};
use crate::imaging::{
    BackendError, EncodeError, EncodedImage, ImageBackend, Pipeline, PipelineExecutor,
    SecondaryGate, encode_image, resolve_pipeline,
};
use crate::request::{ParamError, RequestDefaults, TransformRequest};
use crate::store::{ObjectStore, StoreError, StoredObject};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const DEFAULT_CACHE_CONTROL: &str = "public,max-age=15552000";

/// Why a request did not produce a transformed image.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Object Not Found")]
    NotFound,
    #[error(transparent)]
    InvalidParameter(#[from] ParamError),
    #[error("transform failed: {0}")]
    Transform(#[from] BackendError),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::Transform(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EncodeError> for RequestError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Backend(e) => Self::Transform(e),
            EncodeError::Task(e) => Self::Unexpected(e.to_string()),
        }
    }
}

impl From<StoreError> for RequestError {
    fn from(e: StoreError) -> Self {
        Self::Unexpected(e.to_string())
    }
}

/// An inbound request, stripped to what the service needs.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Full request URL; the cache key.
    pub url: String,
    /// Raw path, leading `/` included.
    pub path: String,
    /// Raw query string without the `?`.
    pub query: Option<String>,
    /// Inbound headers, forwarded on secondary image fetches.
    pub headers: HeaderMap,
}

impl ImageRequest {
    /// Build a request from a path-and-query string such as `/a.png?w=10`.
    pub fn new(path_and_query: &str, headers: HeaderMap) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        Self {
            url: format!("http://{host}{path_and_query}"),
            path: path.to_string(),
            query,
            headers,
        }
    }

    /// Bucket key: the path without its leading `/`, percent-decoded.
    pub fn object_key(&self) -> String {
        let trimmed = self.path.strip_prefix('/').unwrap_or(&self.path);
        percent_decode_str(trimmed).decode_utf8_lossy().into_owned()
    }
}

/// Outbound response.
pub type ImageResponse = CachedResponse;

/// Plain-text response carrying the error message, for faults raised before
/// the stored object is in hand.
fn error_response(error: RequestError) -> ImageResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    ImageResponse {
        status: error.status(),
        headers,
        body: Bytes::from(error.to_string()),
    }
}

fn passthrough(object: StoredObject) -> ImageResponse {
    ImageResponse {
        status: StatusCode::OK,
        headers: object.http_headers(),
        body: object.body,
    }
}

/// The image service. Cheap to share behind an `Arc`.
pub struct ImageService {
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn ResponseCache>,
    backend: Arc<dyn ImageBackend>,
    gate: SecondaryGate,
    defaults: RequestDefaults,
    append: Pipeline,
    cache_control: HeaderValue,
}

impl ImageService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn ResponseCache>,
        backend: Arc<dyn ImageBackend>,
        gate: SecondaryGate,
    ) -> Self {
        Self {
            store,
            cache,
            backend,
            gate,
            defaults: RequestDefaults::default(),
            append: Pipeline::empty(),
            cache_control: HeaderValue::from_static(DEFAULT_CACHE_CONTROL),
        }
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Stages run after the planned resize/crop of every transform.
    pub fn with_appended_pipeline(mut self, append: Pipeline) -> Self {
        self.append = append;
        self
    }

    /// Falls back to the default header if `value` is not a valid header.
    pub fn with_cache_control(mut self, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => self.cache_control = v,
            Err(_) => warn!(%value, "invalid cache-control value, keeping default"),
        }
        self
    }

    pub async fn handle(&self, request: ImageRequest) -> ImageResponse {
        match self.cache.lookup(&request.url).await {
            Ok(Some(hit)) => {
                debug!(url = %request.url, "cache hit");
                return hit;
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "cache lookup failed"),
        }

        let key = request.object_key();
        let object = match self.store.get(&key).await {
            Ok(Some(object)) => object,
            Ok(None) => return error_response(RequestError::NotFound),
            Err(e) => {
                let e = RequestError::from(e);
                error!(%key, error = %e, "object store failure");
                return ImageResponse {
                    status: e.status(),
                    headers: HeaderMap::new(),
                    body: Bytes::new(),
                };
            }
        };

        let params = match TransformRequest::from_query(request.query.as_deref(), self.defaults) {
            Ok(params) => params,
            Err(e) => return error_response(e.into()),
        };
        if !params.wants_resize() {
            debug!(%key, "no resize requested, passing through");
            return passthrough(object);
        }

        match self.transform(&object.body, &params, &request.headers).await {
            Ok(Some(encoded)) => {
                let response = self.transformed_response(encoded);
                self.spawn_cache_store(request.url, response.clone());
                response
            }
            Ok(None) => {
                debug!(%key, "nothing to transform, passing through");
                passthrough(object)
            }
            Err(e) => {
                error!(%key, error = %e, "transform failed");
                ImageResponse {
                    status: e.status(),
                    headers: object.http_headers(),
                    body: object.body,
                }
            }
        }
    }

    /// Decode, plan, execute and encode. `Ok(None)` when the plan is empty.
    async fn transform(
        &self,
        bytes: &[u8],
        params: &TransformRequest,
        headers: &HeaderMap,
    ) -> Result<Option<EncodedImage>, RequestError> {
        let source = self.backend.decode(bytes)?;
        let natural = source.dimensions();
        let planned = resolve_pipeline(params.width, params.height, natural);
        if planned.is_empty() {
            return Ok(None);
        }
        let pipeline = planned.then(&self.append);
        info!(
            natural_width = natural.width,
            natural_height = natural.height,
            %pipeline,
            format = %params.format,
            "transforming"
        );

        let executor = PipelineExecutor::new(self.backend.as_ref(), &self.gate);
        let output = executor.execute(source, &pipeline, headers).await?;
        let encoded =
            encode_image(self.backend.clone(), output, params.format, params.quality).await?;
        Ok(Some(encoded))
    }

    fn transformed_response(&self, encoded: EncodedImage) -> ImageResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(encoded.content_type),
        );
        headers.insert(header::CACHE_CONTROL, self.cache_control.clone());
        ImageResponse {
            status: StatusCode::OK,
            headers,
            body: encoded.bytes,
        }
    }

    fn spawn_cache_store(&self, url: String, response: ImageResponse) {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.store(&url, &response).await {
                warn!(%url, error = %e, "cache store failed");
            }
        });
    }
}
