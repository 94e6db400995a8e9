//! Parameter types for image operations.
//!
//! These types describe *what* to do, not *how* to do it. They are the
//! vocabulary shared by the [`pipeline`](super::pipeline) stages, the
//! [`backend`](super::backend) that does the pixel work, and the request
//! validator that turns query strings into them.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (0–100, default 75). Clamped on construction.
//! - [`OutputFormat`]: Response encoding: JPEG, PNG or WebP.
//! - [`SamplingFilter`]: Resampling filter, addressed by its numeric code in pipeline text.
//! - [`BlendMode`]: How a blended secondary image is combined with the primary.
//! - [`CropRegion`]: Corner coordinates of a crop box.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Encoded output format of a transformed response.
///
/// `jpg` is accepted as an alias of `jpeg` everywhere a format is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    #[default]
    Webp,
}

impl OutputFormat {
    /// Parse a query-string format name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resampling filter used by resize stages.
///
/// The numeric codes are the ones used in pipeline text (`resize!800,400,1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingFilter {
    Nearest = 1,
    Triangle = 2,
    CatmullRom = 3,
    Gaussian = 4,
    Lanczos3 = 5,
}

impl SamplingFilter {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Nearest),
            2 => Some(Self::Triangle),
            3 => Some(Self::CatmullRom),
            4 => Some(Self::Gaussian),
            5 => Some(Self::Lanczos3),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Triangle => "triangle",
            Self::CatmullRom => "catmull-rom",
            Self::Gaussian => "gaussian",
            Self::Lanczos3 => "lanczos3",
        }
    }
}

impl From<SamplingFilter> for FilterType {
    fn from(filter: SamplingFilter) -> Self {
        match filter {
            SamplingFilter::Nearest => FilterType::Nearest,
            SamplingFilter::Triangle => FilterType::Triangle,
            SamplingFilter::CatmullRom => FilterType::CatmullRom,
            SamplingFilter::Gaussian => FilterType::Gaussian,
            SamplingFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// How a blend stage combines the secondary image with the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Alpha-composite the secondary over the primary, anchored at the origin.
    Over,
    /// Overwrite primary pixels with the secondary's, anchored at the origin.
    Replace,
}

impl BlendMode {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "over" => Some(Self::Over),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Over => "over",
            Self::Replace => "replace",
        }
    }
}

/// Crop box given by its top-left (`x1`, `y1`) and bottom-right (`x2`, `y2`)
/// corners. The bottom-right corner is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropRegion {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}
