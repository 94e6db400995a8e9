//! Secondary image fetching for blend and watermark stages.
//!
//! A multi-image stage names a second image by URL. Before anything is
//! fetched the URL's host must end with one of the configured [`Whitelist`]
//! suffixes (an empty whitelist allows every host). The image is then fetched
//! through a [`SecondaryFetcher`], forwarding the inbound request's headers,
//! and decoded by the backend.
//!
//! Failing to obtain the bytes (bad URL, host not allowed, network error,
//! non-success status) is logged and swallowed: the stage becomes a no-op and
//! the primary image continues down the pipeline. Bytes that arrive but do
//! not decode are a transform fault and fail the request.

use super::backend::{BackendError, ImageBackend, ImageHandle};
use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, header};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid secondary image URL '{0}'")]
    InvalidUrl(String),
    #[error("host '{0}' is not whitelisted")]
    NotAllowed(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream responded {0}")]
    Status(StatusCode),
}

/// Allowed hostname suffixes for secondary images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    suffixes: Vec<String>,
}

impl Whitelist {
    /// Blank entries are dropped, so `""` and `"a.com,,"` never turn into a
    /// suffix that matches every host.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list, as given in the `WHITE_LIST` variable.
    pub fn parse(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    pub fn allows(&self, url: &Url) -> bool {
        if self.suffixes.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.suffixes.iter().any(|suffix| host.ends_with(suffix.as_str()))
    }
}

/// Fetches secondary image bytes.
#[async_trait]
pub trait SecondaryFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes, FetchError>;
}

/// [`SecondaryFetcher`] over HTTP(S) using `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Inbound headers that must not be replayed against another origin.
const NOT_FORWARDED: &[header::HeaderName] = &[
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
    // The client is built without decompression support.
    header::ACCEPT_ENCODING,
];

fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in NOT_FORWARDED {
        headers.remove(name);
    }
    headers
}

#[async_trait]
impl SecondaryFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .headers(forwarded_headers(headers))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.bytes().await?)
    }
}

/// Whitelist check + fetch + decode for multi-image stages.
#[derive(Clone)]
pub struct SecondaryGate {
    whitelist: Whitelist,
    fetcher: Arc<dyn SecondaryFetcher>,
}

impl SecondaryGate {
    pub fn new(whitelist: Whitelist, fetcher: Arc<dyn SecondaryFetcher>) -> Self {
        Self { whitelist, fetcher }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Fetch and decode the secondary image.
    ///
    /// `Ok(None)` when the bytes could not be obtained; a decode failure is
    /// returned as an error.
    pub async fn acquire(
        &self,
        source: &str,
        headers: &HeaderMap,
        backend: &dyn ImageBackend,
    ) -> Result<Option<ImageHandle>, BackendError> {
        let bytes = match self.fetch(source, headers).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%source, error = %e, "secondary image unavailable, skipping stage");
                return Ok(None);
            }
        };
        let handle = backend.decode(&bytes)?;
        debug!(%source, "fetched secondary image");
        Ok(Some(handle))
    }

    async fn fetch(&self, source: &str, headers: &HeaderMap) -> Result<Bytes, FetchError> {
        let url = Url::parse(source).map_err(|_| FetchError::InvalidUrl(source.to_string()))?;
        if !self.whitelist.allows(&url) {
            return Err(FetchError::NotAllowed(
                url.host_str().unwrap_or_default().to_string(),
            ));
        }
        self.fetcher.fetch(&url, headers).await
    }
}

impl std::fmt::Debug for SecondaryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondaryGate")
            .field("whitelist", &self.whitelist)
            .finish_non_exhaustive()
    }
}
