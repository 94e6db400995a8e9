//! Aspect resolution: requested box versus natural size.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;
use super::params::{CropRegion, SamplingFilter};
use super::pipeline::{Pipeline, PipelineStage};

/// Filter used for every resize the resolver plans.
pub const RESIZE_FILTER: SamplingFilter = SamplingFilter::Nearest;

/// Plan the stages that turn an image of `natural` size into the requested
/// `width` x `height` box.
///
/// A zero dimension means "derive from the other one". The result is empty
/// (pass-through) when nothing was requested or when the request would
/// upscale past the source resolution on either axis.
///
/// When both dimensions are given and the aspect ratios differ, the image is
/// resized to cover the box at its natural ratio and then cropped from the
/// top-left corner.
///
/// # Examples
/// ```
/// # use imgfly::imaging::{Dimensions, resolve_pipeline};
/// let plan = resolve_pipeline(400, 400, Dimensions::new(1000, 500));
/// assert_eq!(plan.to_string(), "resize!800,400,1|crop!0,0,400,400");
/// ```
pub fn resolve_pipeline(width: u32, height: u32, natural: Dimensions) -> Pipeline {
    let Dimensions {
        width: ow,
        height: oh,
    } = natural;

    if width > ow || height > oh {
        return Pipeline::empty();
    }
    if width == 0 && height == 0 {
        return Pipeline::empty();
    }

    if width > 0 && height > 0 {
        let target_ratio = width as f64 / height as f64;
        let natural_ratio = ow as f64 / oh as f64;

        // Exact comparison: ratios that differ only by rounding still crop.
        if target_ratio == natural_ratio {
            return Pipeline::new(vec![resize(width, height)]);
        }

        let (cover_w, cover_h) = if target_ratio > natural_ratio {
            (width, scale(oh, width, ow))
        } else {
            (scale(ow, height, oh), height)
        };
        return Pipeline::new(vec![
            resize(cover_w, cover_h),
            PipelineStage::Crop(CropRegion::new(0, 0, width, height)),
        ]);
    }

    let (width, height) = derive_missing_dimension(width, height, natural);
    Pipeline::new(vec![resize(width, height)])
}

/// Fill in whichever of `width`/`height` is zero from the natural aspect
/// ratio, rounding down.
pub fn derive_missing_dimension(width: u32, height: u32, natural: Dimensions) -> (u32, u32) {
    let mut width = width;
    let mut height = height;
    if width == 0 {
        width = scale(natural.width, height, natural.height);
    }
    if height == 0 {
        height = scale(natural.height, width, natural.width);
    }
    (width, height)
}

/// `floor(value * numerator / denominator)` without intermediate rounding.
fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return 0;
    }
    let scaled = u64::from(value) * u64::from(numerator) / u64::from(denominator);
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

fn resize(width: u32, height: u32) -> PipelineStage {
    PipelineStage::Resize {
        width,
        height,
        filter: RESIZE_FILTER,
    }
}
