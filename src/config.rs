//! Handler configuration.
//!
//! Loads an optional `image-fanout.toml`, merges it over the stock defaults,
//! applies environment overrides and validates the result. The stock defaults
//! reproduce the standard profile set, so an empty file (or no file) plus an
//! `OUTPUT_BUCKET` is a complete configuration.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_bucket = "renditions"   # Destination bucket (no default; required)
//!
//! [processing]
//! parallel = true                # Fan out resolutions on the thread pool
//! max_threads = 4                # Omit for auto = CPU cores
//! on_error = "fail-fast"         # or "best-effort"
//!
//! [store]
//! root = "buckets"               # Directory holding one folder per bucket
//!
//! [[resolutions]]
//! label = "1080p"
//! width = 1920
//! height = 1080
//!
//! [[formats]]
//! format = "jpeg"
//! quality = 85
//! optimize = true
//! ```
//!
//! `resolutions` and `formats` are arrays: a file that sets either replaces
//! the whole stock list rather than merging into it. Unknown keys are
//! rejected to catch typos early.
//!
//! ## Environment
//!
//! `OUTPUT_BUCKET`, when set and non-empty, replaces `output_bucket`.

use crate::imaging::{FormatKind, OutputFormat, ProfileError, Profiles, Quality, TargetSpec};
use crate::process::{FailurePolicy, ProcessOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `output_bucket`.
pub const OUTPUT_BUCKET_ENV: &str = "OUTPUT_BUCKET";

/// Config file looked up when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "image-fanout.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to serialize stock config: {0}")]
    Stock(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Missing OUTPUT_BUCKET")]
    MissingOutputBucket,
}

/// Handler configuration loaded from `image-fanout.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// Destination bucket for every artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_bucket: Option<String>,
    pub processing: ProcessingConfig,
    pub store: StoreConfig,
    /// Target resolutions, in output order.
    pub resolutions: Vec<ResolutionConfig>,
    /// Output encodings, in output order.
    pub formats: Vec<FormatConfig>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        let profiles = Profiles::standard();
        Self {
            output_bucket: None,
            processing: ProcessingConfig::default(),
            store: StoreConfig::default(),
            resolutions: profiles
                .targets()
                .iter()
                .map(ResolutionConfig::from)
                .collect(),
            formats: profiles.formats().iter().map(FormatConfig::from).collect(),
        }
    }
}

impl HandlerConfig {
    /// The destination bucket, or the configuration error the handler
    /// reports before touching any store.
    pub fn require_output_bucket(&self) -> Result<&str, ConfigError> {
        match self.output_bucket.as_deref() {
            Some(bucket) if !bucket.trim().is_empty() => Ok(bucket),
            _ => Err(ConfigError::MissingOutputBucket),
        }
    }

    /// Validate config values are within acceptable ranges.
    ///
    /// Format identifiers are not checked here; [`profiles`](Self::profiles)
    /// reports unknown ones as unsupported formats.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolutions.is_empty() {
            return Err(ConfigError::Validation(
                "resolutions must not be empty".into(),
            ));
        }
        if self.formats.is_empty() {
            return Err(ConfigError::Validation("formats must not be empty".into()));
        }
        for (i, res) in self.resolutions.iter().enumerate() {
            if res.label.is_empty() || res.label.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "resolutions[{i}].label must be non-empty and contain no '/'"
                )));
            }
            if res.label.chars().all(|c| c == '.') {
                return Err(ConfigError::Validation(format!(
                    "resolutions[{i}].label must not consist only of dots"
                )));
            }
            if res.width == 0 || res.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "resolutions[{i}] ({}) dimensions must be non-zero",
                    res.label
                )));
            }
            if self.resolutions[..i].iter().any(|r| r.label == res.label) {
                return Err(ConfigError::Validation(format!(
                    "duplicate resolution label {:?}",
                    res.label
                )));
            }
        }
        for (i, fmt) in self.formats.iter().enumerate() {
            if !(1..=100).contains(&fmt.quality) {
                return Err(ConfigError::Validation(format!(
                    "formats[{i}].quality must be 1-100"
                )));
            }
            if fmt.method.is_some_and(|m| m > OutputFormat::MAX_WEBP_METHOD) {
                return Err(ConfigError::Validation(format!(
                    "formats[{i}].method must be 0-{}",
                    OutputFormat::MAX_WEBP_METHOD
                )));
            }
            // Aliases like "jpeg" and "jpg" share one artifact extension
            if let Ok(kind) = FormatKind::from_name(&fmt.format) {
                let repeated = self.formats[..i]
                    .iter()
                    .any(|f| FormatKind::from_name(&f.format).is_ok_and(|k| k == kind));
                if repeated {
                    return Err(ConfigError::Validation(format!(
                        "formats[{i}] repeats output format {kind}"
                    )));
                }
            }
        }
        if self.processing.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build the immutable profile sets the transcoder runs with.
    pub fn profiles(&self) -> Result<Profiles, ProfileError> {
        let targets = self
            .resolutions
            .iter()
            .map(|r| TargetSpec::new(r.label.clone(), r.width, r.height))
            .collect::<Result<Vec<_>, _>>()?;
        let formats = self
            .formats
            .iter()
            .map(FormatConfig::to_output_format)
            .collect::<Result<Vec<_>, _>>()?;
        Profiles::new(targets, formats)
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            parallel: self.processing.parallel,
            on_error: self.processing.on_error,
        }
    }

    /// Replace settings from the environment. `lookup` is `std::env::var`
    /// in the binary and a closure over a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup(OUTPUT_BUCKET_ENV).filter(|b| !b.trim().is_empty()) {
            self.output_bucket = Some(bucket);
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Run resolutions on the thread pool instead of one after another.
    pub parallel: bool,
    /// Maximum number of worker threads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_threads: Option<usize>,
    pub on_error: FailurePolicy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_threads: None,
            on_error: FailurePolicy::FailFast,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Root directory of the filesystem store.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("buckets"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

impl From<&TargetSpec> for ResolutionConfig {
    fn from(target: &TargetSpec) -> Self {
        Self {
            label: target.label().to_string(),
            width: target.width(),
            height: target.height(),
        }
    }
}

/// One `[[formats]]` entry. `optimize` applies to JPEG, `method` to WebP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatConfig {
    pub format: String,
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<u8>,
}

fn default_quality() -> u32 {
    Quality::default().value()
}

impl FormatConfig {
    fn to_output_format(&self) -> Result<OutputFormat, ProfileError> {
        let quality = Quality::new(self.quality);
        Ok(match FormatKind::from_name(&self.format)? {
            FormatKind::Jpeg => OutputFormat::Jpeg {
                quality,
                optimize: self.optimize.unwrap_or(true),
            },
            FormatKind::WebP => OutputFormat::WebP {
                quality,
                method: self
                    .method
                    .unwrap_or(OutputFormat::MAX_WEBP_METHOD)
                    .min(OutputFormat::MAX_WEBP_METHOD),
            },
        })
    }
}

impl From<&OutputFormat> for FormatConfig {
    fn from(format: &OutputFormat) -> Self {
        match *format {
            OutputFormat::Jpeg { quality, optimize } => Self {
                format: "jpeg".to_string(),
                quality: quality.value(),
                optimize: Some(optimize),
                method: None,
            },
            OutputFormat::WebP { quality, method } => Self {
                format: "webp".to_string(),
                quality: quality.value(),
                optimize: None,
                method: Some(method),
            },
        }
    }
}

// =============================================================================
// Config loading and merging
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(HandlerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<HandlerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: HandlerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path` (if present), apply environment overrides from
/// `lookup` and validate.
///
/// A missing output bucket is not an error here; the handler reports it per
/// invocation.
pub fn load_config<F>(path: &Path, lookup: F) -> Result<HandlerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    let mut config = resolve_config(base, overlay)?;
    config.apply_env_overrides(lookup);
    Ok(config)
}

/// Returns a fully-commented stock `image-fanout.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# image-fanout configuration
# ==========================
# All settings are optional except the output bucket, which may instead be
# supplied through the OUTPUT_BUCKET environment variable.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Bucket every artifact is written to.
# output_bucket = "renditions"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Render resolutions concurrently on the thread pool.
parallel = true

# Maximum worker threads. Omit to use all CPU cores.
# Values larger than the core count are clamped down.
# max_threads = 4

# What to do once one artifact fails:
#   "fail-fast"   - stop scheduling further work and report that failure
#   "best-effort" - finish every other artifact, then report all failures
on_error = "fail-fast"

# ---------------------------------------------------------------------------
# Store
# ---------------------------------------------------------------------------
[store]
# Directory holding one sub-directory per bucket.
root = "buckets"

# ---------------------------------------------------------------------------
# Target resolutions
# ---------------------------------------------------------------------------
# Every source is resized to exactly these dimensions (no aspect-ratio
# preservation). The label becomes the first segment of the artifact key:
#   {label}/{source name without extension}.{jpg|webp}
# Setting [[resolutions]] replaces the whole list below.

[[resolutions]]
label = "1080p"
width = 1920
height = 1080

[[resolutions]]
label = "720p"
width = 1280
height = 720

[[resolutions]]
label = "480p"
width = 854
height = 480

# ---------------------------------------------------------------------------
# Output formats
# ---------------------------------------------------------------------------
# Each resolution is encoded once per format. Supported: "jpeg", "webp".
# quality: 1-100
# optimize (jpeg): optimized Huffman tables
# method (webp): compression effort 0 (fast) to 6 (smallest)
# Setting [[formats]] replaces the whole list below.

[[formats]]
format = "jpeg"
quality = 85
optimize = true

[[formats]]
format = "webp"
quality = 85
method = 6
"##
}
