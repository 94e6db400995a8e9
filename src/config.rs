//! Server configuration module.
//!
//! Handles loading and validating `imgfly.toml`. Every value has a default,
//! so a config file only needs the keys it wants to change, and running with
//! no config file at all is valid.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "127.0.0.1:8787"   # Listen address
//!
//! [storage]
//! root = "bucket"           # Directory holding the source objects
//!
//! [cache]
//! enabled = true            # Cache transformed responses on disk
//! dir = ".imgfly-cache"     # Cache directory
//! max_age = 15552000        # cache-control max-age on transformed responses
//!
//! [secondary]
//! whitelist = []            # Host suffixes allowed for blend/watermark images
//!
//! [defaults]
//! format = "webp"           # Output format when ?format= is absent
//! quality = 75              # Encoding quality when ?quality= is absent
//!
//! [pipeline]
//! append = ""               # Stages appended to every transform
//!
//! [log]
//! level = "info"            # Overridden by RUST_LOG
//! ```
//!
//! ## Environment
//!
//! `WHITE_LIST` (comma-separated host suffixes) replaces
//! `secondary.whitelist` when set and non-empty.
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{OutputFormat, Pipeline, Quality, Whitelist};
use crate::request::RequestDefaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `secondary.whitelist`.
pub const WHITELIST_ENV: &str = "WHITE_LIST";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration loaded from `imgfly.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listener settings.
    pub server: ListenConfig,
    /// Source bucket location.
    pub storage: StorageConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Secondary image (blend/watermark) settings.
    pub secondary: SecondaryConfig,
    /// Fallbacks for absent query parameters.
    pub defaults: DefaultsConfig,
    /// Operator-configured pipeline stages.
    pub pipeline: PipelineConfig,
    /// Logging settings.
    pub log: LogConfig,
}

impl ServerConfig {
    /// Load a config file, or the defaults when `path` is `None`.
    ///
    /// Environment overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(std::env::var(WHITELIST_ENV).ok().as_deref());
        config.validate()?;
        Ok(config)
    }

    /// Apply the `WHITE_LIST` override, if it holds any entries.
    pub fn apply_env(&mut self, whitelist: Option<&str>) {
        if let Some(csv) = whitelist {
            let parsed = Whitelist::parse(csv);
            if !parsed.is_empty() {
                self.secondary.whitelist = parsed.suffixes().to_vec();
            }
        }
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.quality > 100 {
            return Err(ConfigError::Validation(
                "defaults.quality must be 0-100".into(),
            ));
        }
        if self.cache.max_age == 0 {
            return Err(ConfigError::Validation(
                "cache.max_age must be non-zero".into(),
            ));
        }
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Validation(format!("server.bind: {e}")))?;
        self.append_pipeline()?;
        Ok(())
    }

    /// The parsed `pipeline.append` stages.
    pub fn append_pipeline(&self) -> Result<Pipeline, ConfigError> {
        self.pipeline
            .append
            .parse()
            .map_err(|e| ConfigError::Validation(format!("pipeline.append: {e}")))
    }

    pub fn whitelist(&self) -> Whitelist {
        Whitelist::new(&self.secondary.whitelist)
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            format: self.defaults.format,
            quality: Quality::new(self.defaults.quality),
        }
    }

    pub fn cache_control(&self) -> String {
        format!("public,max-age={}", self.cache.max_age)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    /// Socket address to listen on.
    pub bind: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Source bucket location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory whose files are served by key.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("bucket"),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether transformed responses are cached.
    pub enabled: bool,
    /// Directory for cache entries.
    pub dir: PathBuf,
    /// `max-age` (seconds) sent in `cache-control` on transformed responses.
    pub max_age: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".imgfly-cache"),
            max_age: 15_552_000,
        }
    }
}

/// Secondary image settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecondaryConfig {
    /// Hostname suffixes secondary images may be fetched from.
    /// Empty allows every host.
    pub whitelist: Vec<String>,
}

/// Fallbacks for absent query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub format: OutputFormat,
    pub quality: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Webp,
            quality: 75,
        }
    }
}

/// Operator-configured pipeline stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline text appended after the planned resize/crop of every
    /// transformed request, e.g. a site-wide watermark.
    pub append: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A documented stock `imgfly.toml` with every option at its default.
pub fn stock_config_toml() -> &'static str {
    r##"# imgfly Configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Listener
# ---------------------------------------------------------------------------
[server]
# Socket address to listen on.
bind = "127.0.0.1:8787"

# ---------------------------------------------------------------------------
# Source bucket
# ---------------------------------------------------------------------------
[storage]
# Directory holding the source objects. GET /<key> serves <root>/<key>.
root = "bucket"

# ---------------------------------------------------------------------------
# Response cache
# ---------------------------------------------------------------------------
[cache]
# Cache transformed responses on disk, keyed by request URL.
enabled = true

# Directory for cache entries.
dir = ".imgfly-cache"

# max-age (seconds) of the cache-control header on transformed responses.
max_age = 15552000

# ---------------------------------------------------------------------------
# Secondary images (blend / watermark stages)
# ---------------------------------------------------------------------------
[secondary]
# Hostname suffixes secondary images may be fetched from.
# Empty allows every host. The WHITE_LIST environment variable
# (comma-separated) replaces this list when set.
whitelist = []

# ---------------------------------------------------------------------------
# Request defaults
# ---------------------------------------------------------------------------
[defaults]
# Output format when ?format= is absent: "webp", "jpeg" (or "jpg"), "png".
format = "webp"

# Encoding quality when ?quality= is absent (0-100, ignored for png).
quality = 75

# ---------------------------------------------------------------------------
# Pipeline
# ---------------------------------------------------------------------------
[pipeline]
# Stages appended after the planned resize/crop of every transformed
# request, e.g. a site-wide watermark:
#   append = "watermark!https%3A%2F%2Fcdn.example.com%2Flogo.png,10,10"
append = ""

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[log]
# Default tracing filter; RUST_LOG takes precedence.
level = "info"
"##
}
