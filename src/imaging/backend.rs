//! Image transform capability trait and shared types.
//!
//! The [`ImageBackend`] trait is the only place pixels are touched. Everything
//! above it (resolver, executor, service) deals in [`ImageHandle`]s and
//! parameter types, so a mock backend can stand in during tests.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! and `webp` crates.
//!
//! ## Handle ownership
//!
//! An [`ImageHandle`] exclusively owns one decoded pixel buffer. Single-image
//! operations (resize, crop) consume the handle and return a new one, so the
//! caller can never hold two primary buffers at once. Multi-image operations
//! (blend, watermark) mutate the primary in place and only borrow the
//! secondary. A handle's buffer is released when it is dropped, which covers
//! normal returns, early returns and `?` propagation alike.

use super::params::{BlendMode, CropRegion, OutputFormat, Quality, SamplingFilter};
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Natural or target size of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Exclusively owned decoded image.
#[derive(Debug)]
pub struct ImageHandle {
    image: DynamicImage,
}

impl ImageHandle {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = self.image.dimensions();
        Dimensions { width, height }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut DynamicImage {
        &mut self.image
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        let Dimensions { width, height } = self.dimensions();
        tracing::trace!(width, height, "released image buffer");
    }
}

/// Image transform capability.
///
/// Every backend implements all six operations so the pipeline executor and
/// encoder stay backend-agnostic.
pub trait ImageBackend: Send + Sync {
    /// Decode raw bytes into a fresh handle.
    fn decode(&self, bytes: &[u8]) -> Result<ImageHandle, BackendError>;

    /// Resize to exactly `width` x `height`.
    fn resize(
        &self,
        image: ImageHandle,
        width: u32,
        height: u32,
        filter: SamplingFilter,
    ) -> Result<ImageHandle, BackendError>;

    /// Cut `region` out of the image.
    fn crop(&self, image: ImageHandle, region: CropRegion) -> Result<ImageHandle, BackendError>;

    /// Combine `layer` into `image` in place.
    fn blend(
        &self,
        image: &mut ImageHandle,
        layer: &ImageHandle,
        mode: BlendMode,
    ) -> Result<(), BackendError>;

    /// Composite `mark` over `image` at offset (`x`, `y`) in place.
    fn watermark(
        &self,
        image: &mut ImageHandle,
        mark: &ImageHandle,
        x: i64,
        y: i64,
    ) -> Result<(), BackendError>;

    /// Encode the image. `quality` is ignored by lossless formats.
    fn encode(
        &self,
        image: &ImageHandle,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;
}
