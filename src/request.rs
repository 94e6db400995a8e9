//! Query-string validation.
//!
//! Turns `?w=&h=&format=&quality=` into a [`TransformRequest`]. Absent or
//! empty `w`/`h` mean 0. Format and quality only matter when a resize was
//! requested, so they are only validated then; a request without dimensions
//! always gets the stored bytes back.

use crate::imaging::{OutputFormat, Quality};
use std::num::IntErrorKind;
use thiserror::Error;
use url::form_urlencoded;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParamError {
    #[error("Invalid w or h")]
    Dimensions,
    #[error("Invalid format")]
    Format(String),
    #[error("Invalid quality")]
    Quality(String),
}

/// Fallbacks for parameters the query leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDefaults {
    pub format: OutputFormat,
    pub quality: Quality,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            format: OutputFormat::Webp,
            quality: Quality::default(),
        }
    }
}

/// Validated transform parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformRequest {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}

impl TransformRequest {
    /// Parse a raw query string (without the leading `?`).
    ///
    /// For repeated keys the first occurrence wins.
    pub fn from_query(query: Option<&str>, defaults: RequestDefaults) -> Result<Self, ParamError> {
        let mut w = None;
        let mut h = None;
        let mut format = None;
        let mut quality = None;
        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            let slot = match &*key {
                "w" => &mut w,
                "h" => &mut h,
                "format" => &mut format,
                "quality" => &mut quality,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        let width = parse_dimension(w.as_deref())?;
        let height = parse_dimension(h.as_deref())?;
        let mut request = Self {
            width,
            height,
            format: defaults.format,
            quality: defaults.quality,
        };
        if !request.wants_resize() {
            return Ok(request);
        }

        if let Some(name) = format.filter(|f| !f.is_empty()) {
            request.format = OutputFormat::parse(&name).ok_or(ParamError::Format(name))?;
        }
        if let Some(value) = quality.filter(|q| !q.is_empty()) {
            request.quality = match value.trim().parse::<u32>() {
                Ok(q) if q <= 100 => Quality::new(q),
                _ => return Err(ParamError::Quality(value)),
            };
        }
        Ok(request)
    }

    /// Whether any dimension was requested at all.
    pub fn wants_resize(&self) -> bool {
        self.width > 0 || self.height > 0
    }
}

/// Empty means 0; anything but a non-negative integer is rejected.
///
/// Integers too large for `u32` saturate to `u32::MAX`, which exceeds any
/// natural size and so resolves to a pass-through.
fn parse_dimension(value: Option<&str>) -> Result<u32, ParamError> {
    match value.map(str::trim) {
        None | Some("") => Ok(0),
        Some(v) => v.parse::<u32>().or_else(|e| match e.kind() {
            IntErrorKind::PosOverflow => Ok(u32::MAX),
            _ => Err(ParamError::Dimensions),
        }),
    }
}
