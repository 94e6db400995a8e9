//! Image processing: planning and executing transforms.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory_with_format` |
//! | **Resize / crop** | `image::DynamicImage::{resize_exact, crop_imm}` |
//! | **Blend / watermark** | `image::imageops::{overlay, replace}` |
//! | **Encode** | `image` JPEG/PNG encoders, `webp` for lossy WebP |
//!
//! The module is split into:
//! - **Calculations**: Aspect resolution, request box vs. natural size (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Pipeline**: Ordered stages and their `action!p1,p2|...` text form
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Executor**: Runs a pipeline against a backend
//! - **Secondary**: Whitelisted fetch of the second image for blend/watermark
//! - **Encoder**: Output format dispatch

pub mod backend;
mod calculations;
pub mod encoder;
pub mod executor;
mod params;
pub mod pipeline;
pub mod rust_backend;
pub mod secondary;

pub use backend::{BackendError, Dimensions, ImageBackend, ImageHandle};
pub use calculations::{RESIZE_FILTER, derive_missing_dimension, resolve_pipeline};
pub use encoder::{EncodeError, EncodedImage, encode_image};
pub use executor::PipelineExecutor;
pub use params::{BlendMode, CropRegion, OutputFormat, Quality, SamplingFilter};
pub use pipeline::{Pipeline, PipelineError, PipelineStage};
pub use rust_backend::{RustBackend, supported_input_formats};
pub use secondary::{FetchError, HttpFetcher, SecondaryFetcher, SecondaryGate, Whitelist};
