//! Output encoding.
//!
//! Picks the codec for the requested [`OutputFormat`]. WebP encoding is the
//! slow path, so it runs on the blocking pool instead of the request task.

use super::backend::{BackendError, ImageBackend, ImageHandle};
use super::params::{OutputFormat, Quality};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Encoded response body with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Bytes,
    pub content_type: &'static str,
}

/// Encode `image`, consuming it.
pub async fn encode_image(
    backend: Arc<dyn ImageBackend>,
    image: ImageHandle,
    format: OutputFormat,
    quality: Quality,
) -> Result<EncodedImage, EncodeError> {
    let bytes = match format {
        OutputFormat::Jpeg | OutputFormat::Png => backend.encode(&image, format, quality)?,
        OutputFormat::Webp => {
            tokio::task::spawn_blocking(move || backend.encode(&image, format, quality)).await??
        }
    };
    Ok(EncodedImage {
        bytes: Bytes::from(bytes),
        content_type: format.content_type(),
    })
}
