//! CLI output formatting.
//!
//! Formatters return lines instead of printing so they can be tested; the
//! binary prints them.
//!
//! ## Plan
//!
//! ```text
//! 1000x500 -> 400x400
//!     1 resize 800x400 (nearest)
//!     2 crop 0,0 -> 400,400
//! Pipeline: resize!800,400,1|crop!0,0,400,400
//! ```
//!
//! ## Check
//!
//! ```text
//! Config
//!     bind: 127.0.0.1:8787
//!     bucket: bucket
//!     cache: .imgfly-cache (max-age 15552000)
//!     whitelist: (any host)
//! Decoders
//!     jpg, png, gif, webp, tif
//! ```

use crate::config::ServerConfig;
use crate::imaging::{Dimensions, Pipeline, PipelineStage};
use image::ImageFormat;

const INDENT: &str = "    ";

fn stage_line(index: usize, stage: &PipelineStage) -> String {
    let detail = match stage {
        PipelineStage::Resize {
            width,
            height,
            filter,
        } => format!("resize {width}x{height} ({})", filter.name()),
        PipelineStage::Crop(region) => format!(
            "crop {},{} -> {},{}",
            region.x1, region.y1, region.x2, region.y2
        ),
        PipelineStage::Blend { source, mode } => format!("blend {source} ({})", mode.name()),
        PipelineStage::Watermark { source, x, y } => format!("watermark {source} at {x},{y}"),
    };
    format!("{INDENT}{} {detail}", index + 1)
}

/// Describe the stages planned for a request of `width` x `height`.
pub fn format_plan(width: u32, height: u32, natural: Dimensions, plan: &Pipeline) -> Vec<String> {
    let mut lines = vec![format!(
        "{}x{} -> {}x{}",
        natural.width, natural.height, width, height
    )];
    if plan.is_empty() {
        lines.push(format!("{INDENT}pass-through (original bytes)"));
        return lines;
    }
    lines.extend(
        plan.stages()
            .iter()
            .enumerate()
            .map(|(i, stage)| stage_line(i, stage)),
    );
    lines.push(format!("Pipeline: {plan}"));
    lines
}

/// Summarize an effective config and the decoders compiled in.
pub fn format_check(config: &ServerConfig, decoders: &[ImageFormat]) -> Vec<String> {
    let mut lines = vec![
        "Config".to_string(),
        format!("{INDENT}bind: {}", config.server.bind),
        format!("{INDENT}bucket: {}", config.storage.root.display()),
    ];
    if config.cache.enabled {
        lines.push(format!(
            "{INDENT}cache: {} (max-age {})",
            config.cache.dir.display(),
            config.cache.max_age
        ));
    } else {
        lines.push(format!("{INDENT}cache: disabled"));
    }
    let whitelist = config.whitelist();
    if whitelist.is_empty() {
        lines.push(format!("{INDENT}whitelist: (any host)"));
    } else {
        lines.push(format!("{INDENT}whitelist: {}", whitelist.suffixes().join(", ")));
    }
    lines.push(format!(
        "{INDENT}defaults: {} q{}",
        config.defaults.format, config.defaults.quality
    ));
    if !config.pipeline.append.trim().is_empty() {
        lines.push(format!("{INDENT}append: {}", config.pipeline.append.trim()));
    }

    lines.push("Decoders".to_string());
    let names: Vec<&str> = decoders
        .iter()
        .map(|f| f.extensions_str().first().copied().unwrap_or("?"))
        .collect();
    lines.push(format!("{INDENT}{}", names.join(", ")));
    lines
}
