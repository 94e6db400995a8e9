//! Pipeline stages and their text form.
//!
//! A [`Pipeline`] is an ordered list of [`PipelineStage`]s executed left to
//! right. Its text form joins stages with `|`, each stage written as
//! `action!p1,p2,...`:
//!
//! ```text
//! resize!800,400,1|crop!0,0,400,400
//! resize!800,400,1|watermark!https%3A%2F%2Fcdn.example.com%2Flogo.png,10,10
//! ```
//!
//! Secondary image URLs are percent-encoded so their commas and `|` cannot
//! split the stage. Parsing is strict: an unknown action, a wrong parameter
//! count or an unparsable number is an error, so a bad pipeline is rejected
//! before any image is touched.

use super::params::{BlendMode, CropRegion, SamplingFilter};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Characters left unescaped in secondary URLs.
const URL_PARAM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("unknown pipeline action '{0}'")]
    UnknownAction(String),
    #[error("'{action}' takes {expected} parameters, got {found}")]
    Arity {
        action: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid parameter '{value}' for '{action}'")]
    InvalidParameter { action: &'static str, value: String },
}

/// One image operation with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Resize {
        width: u32,
        height: u32,
        filter: SamplingFilter,
    },
    Crop(CropRegion),
    /// Combine a fetched secondary image into the primary.
    Blend { source: String, mode: BlendMode },
    /// Composite a fetched secondary image over the primary at an offset.
    Watermark { source: String, x: i64, y: i64 },
}

impl PipelineStage {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::Crop(_) => "crop",
            Self::Blend { .. } => "blend",
            Self::Watermark { .. } => "watermark",
        }
    }

    /// URL of the secondary image for multi-image stages.
    pub fn secondary_source(&self) -> Option<&str> {
        match self {
            Self::Blend { source, .. } | Self::Watermark { source, .. } => Some(source),
            Self::Resize { .. } | Self::Crop(_) => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resize {
                width,
                height,
                filter,
            } => write!(f, "resize!{},{},{}", width, height, filter.code()),
            Self::Crop(r) => write!(f, "crop!{},{},{},{}", r.x1, r.y1, r.x2, r.y2),
            Self::Blend { source, mode } => write!(
                f,
                "blend!{},{}",
                utf8_percent_encode(source, URL_PARAM),
                mode.name()
            ),
            Self::Watermark { source, x, y } => write!(
                f,
                "watermark!{},{},{}",
                utf8_percent_encode(source, URL_PARAM),
                x,
                y
            ),
        }
    }
}

impl FromStr for PipelineStage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (action, options) = s.split_once('!').unwrap_or((s, ""));
        let params: Vec<&str> = if options.is_empty() {
            Vec::new()
        } else {
            options.split(',').collect()
        };

        match action {
            "resize" => {
                let [w, h, filter] = expect_params::<3>("resize", &params)?;
                let code: u8 = number("resize", filter)?;
                Ok(Self::Resize {
                    width: number("resize", w)?,
                    height: number("resize", h)?,
                    filter: SamplingFilter::from_code(code).ok_or_else(|| invalid("resize", filter))?,
                })
            }
            "crop" => {
                let [x1, y1, x2, y2] = expect_params::<4>("crop", &params)?;
                Ok(Self::Crop(CropRegion::new(
                    number("crop", x1)?,
                    number("crop", y1)?,
                    number("crop", x2)?,
                    number("crop", y2)?,
                )))
            }
            "blend" => {
                let [source, mode] = expect_params::<2>("blend", &params)?;
                Ok(Self::Blend {
                    source: decode_url("blend", source)?,
                    mode: BlendMode::parse(mode).ok_or_else(|| invalid("blend", mode))?,
                })
            }
            "watermark" => {
                let [source, x, y] = expect_params::<3>("watermark", &params)?;
                Ok(Self::Watermark {
                    source: decode_url("watermark", source)?,
                    x: number("watermark", x)?,
                    y: number("watermark", y)?,
                })
            }
            other => Err(PipelineError::UnknownAction(other.to_string())),
        }
    }
}

fn expect_params<'a, const N: usize>(
    action: &'static str,
    params: &[&'a str],
) -> Result<[&'a str; N], PipelineError> {
    <[&str; N]>::try_from(params).map_err(|_| PipelineError::Arity {
        action,
        expected: N,
        found: params.len(),
    })
}

fn number<T: FromStr>(action: &'static str, value: &str) -> Result<T, PipelineError> {
    value.trim().parse().map_err(|_| invalid(action, value))
}

fn decode_url(action: &'static str, value: &str) -> Result<String, PipelineError> {
    let decoded = percent_decode_str(value)
        .decode_utf8()
        .map_err(|_| invalid(action, value))?;
    if decoded.is_empty() {
        return Err(invalid(action, value));
    }
    Ok(decoded.into_owned())
}

fn invalid(action: &'static str, value: &str) -> PipelineError {
    PipelineError::InvalidParameter {
        action,
        value: value.to_string(),
    }
}

/// Ordered sequence of stages. Empty means "return the source unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Append every stage of `other` after this pipeline's stages.
    pub fn then(mut self, other: &Pipeline) -> Self {
        self.stages.extend(other.stages.iter().cloned());
        self
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

impl FromStr for Pipeline {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stages = s
            .split('|')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { stages })
    }
}
