//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image::load_from_memory_with_format` |
//! | Resize | `image::DynamicImage::resize_exact` with the stage's filter |
//! | Crop | `image::DynamicImage::crop_imm` |
//! | Blend (`over`) / watermark | `image::imageops::overlay` |
//! | Blend (`replace`) | `image::imageops::replace` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP (lossy) | `webp::Encoder` (libwebp) |

use super::backend::{BackendError, Dimensions, ImageBackend, ImageHandle};
use super::params::{BlendMode, CropRegion, OutputFormat, Quality, SamplingFilter};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat, imageops};
use std::sync::LazyLock;

/// Input formats whose decoders are compiled in.
const INPUT_CANDIDATES: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Built once per process, on first decode.
static DECODERS: LazyLock<Vec<ImageFormat>> = LazyLock::new(|| {
    let formats: Vec<ImageFormat> = INPUT_CANDIDATES
        .iter()
        .copied()
        .filter(|fmt| fmt.reading_enabled())
        .collect();
    tracing::debug!(?formats, "image decoders initialised");
    formats
});

/// Returns the input formats that have working decoders compiled in.
pub fn supported_input_formats() -> &'static [ImageFormat] {
    &DECODERS
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value().clamp(1, 100) as u8);
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut buf))
        .map_err(|e| BackendError::Encode(format!("PNG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba)
        .map_err(|e| BackendError::Encode(format!("WebP encode failed: {}", e)))?;
    Ok(encoder.encode(quality.value() as f32).to_vec())
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<ImageHandle, BackendError> {
        let format = image::guess_format(bytes)
            .map_err(|e| BackendError::Decode(format!("Unrecognised image data: {}", e)))?;
        if !supported_input_formats().contains(&format) {
            return Err(BackendError::Decode(format!(
                "No decoder for {}",
                format.to_mime_type()
            )));
        }
        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(ImageHandle::new(image))
    }

    fn resize(
        &self,
        image: ImageHandle,
        width: u32,
        height: u32,
        filter: SamplingFilter,
    ) -> Result<ImageHandle, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "Cannot resize to {}x{}",
                width, height
            )));
        }
        let resized = image.image().resize_exact(width, height, filter.into());
        Ok(ImageHandle::new(resized))
    }

    fn crop(&self, image: ImageHandle, region: CropRegion) -> Result<ImageHandle, BackendError> {
        let Dimensions { width, height } = image.dimensions();
        if region.x1 >= region.x2 || region.y1 >= region.y2 || region.x2 > width || region.y2 > height
        {
            return Err(BackendError::ProcessingFailed(format!(
                "Crop ({},{})-({},{}) outside {}x{} image",
                region.x1, region.y1, region.x2, region.y2, width, height
            )));
        }
        let cropped =
            image
                .image()
                .crop_imm(region.x1, region.y1, region.width(), region.height());
        Ok(ImageHandle::new(cropped))
    }

    fn blend(
        &self,
        image: &mut ImageHandle,
        layer: &ImageHandle,
        mode: BlendMode,
    ) -> Result<(), BackendError> {
        match mode {
            BlendMode::Over => imageops::overlay(image.image_mut(), layer.image(), 0, 0),
            BlendMode::Replace => imageops::replace(image.image_mut(), layer.image(), 0, 0),
        }
        Ok(())
    }

    fn watermark(
        &self,
        image: &mut ImageHandle,
        mark: &ImageHandle,
        x: i64,
        y: i64,
    ) -> Result<(), BackendError> {
        imageops::overlay(image.image_mut(), mark.image(), x, y);
        Ok(())
    }

    fn encode(
        &self,
        image: &ImageHandle,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        match format {
            OutputFormat::Jpeg => encode_jpeg(image.image(), quality),
            OutputFormat::Png => encode_png(image.image()),
            OutputFormat::Webp => encode_webp(image.image(), quality),
        }
    }
}
