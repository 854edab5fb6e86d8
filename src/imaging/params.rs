//! Profile types for the transcode matrix.
//!
//! These structs describe *what* to produce, not *how*. They are the
//! interface between the orchestration in [`process`](crate::process) (which
//! walks the resolution × format matrix) and the [`backend`](super::backend)
//! (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100). Clamped on construction.
//! - [`TargetSpec`]: A named exact output resolution (`"720p"` → 1280×720).
//! - [`OutputFormat`]: An encoding profile: JPEG or WebP with its knobs.
//! - [`Profiles`]: The immutable, ordered set of targets and formats one
//!   invocation fans out over. [`Profiles::standard`] is the production matrix.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Invalid target {label:?}: {reason}")]
    InvalidTarget { label: String, reason: String },
    #[error("Profile set must contain at least one {0}")]
    Empty(&'static str),
    #[error("Duplicate resolution label: {0}")]
    DuplicateLabel(String),
    #[error("Duplicate output format: {0}")]
    DuplicateFormat(FormatKind),
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// A named resolution profile. Output is forced to exactly
/// `width × height`; source aspect ratio is not preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    label: String,
    width: u32,
    height: u32,
}

impl TargetSpec {
    /// Build a target, rejecting zero dimensions and labels that would not
    /// form a single key segment.
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Result<Self, ProfileError> {
        let label = label.into();
        let reason = if label.is_empty() {
            Some("label must not be empty")
        } else if label.contains('/') {
            Some("label must not contain '/'")
        } else if label.chars().all(|c| c == '.') {
            Some("label must not consist only of dots")
        } else if width == 0 || height == 0 {
            Some("width and height must be non-zero")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ProfileError::InvalidTarget {
                label,
                reason: reason.to_string(),
            }),
            None => Ok(Self {
                label,
                width,
                height,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Encoder families this crate can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Jpeg,
    WebP,
}

impl FormatKind {
    /// Parse a format identifier as written in config (`"jpeg"`, `"jpg"`,
    /// `"webp"`; case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, ProfileError> {
        match name.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            _ => Err(ProfileError::UnsupportedFormat(name.to_string())),
        }
    }

    /// Key extension for artifacts in this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "JPEG",
            Self::WebP => "WEBP",
        })
    }
}

/// An encoding profile with its format-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Baseline mozjpeg encode; `optimize` turns on Huffman table optimization.
    Jpeg { quality: Quality, optimize: bool },
    /// Lossy WebP. `method` is libwebp's effort knob, 0 (fast) to 6 (smallest).
    WebP { quality: Quality, method: u8 },
}

impl OutputFormat {
    pub const MAX_WEBP_METHOD: u8 = 6;

    /// JPEG at quality 85 with entropy optimization.
    pub fn jpeg() -> Self {
        Self::Jpeg {
            quality: Quality::new(85),
            optimize: true,
        }
    }

    /// WebP at quality 85, maximum compression effort.
    pub fn webp() -> Self {
        Self::WebP {
            quality: Quality::new(85),
            method: Self::MAX_WEBP_METHOD,
        }
    }

    pub fn kind(&self) -> FormatKind {
        match self {
            Self::Jpeg { .. } => FormatKind::Jpeg,
            Self::WebP { .. } => FormatKind::WebP,
        }
    }

    pub fn quality(&self) -> Quality {
        match *self {
            Self::Jpeg { quality, .. } | Self::WebP { quality, .. } => quality,
        }
    }

    pub fn extension(&self) -> &'static str {
        self.kind().extension()
    }

    pub fn content_type(&self) -> &'static str {
        self.kind().content_type()
    }
}

/// The ordered resolution × format matrix for one handler.
///
/// Built once at construction and shared read-only by every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profiles {
    targets: Vec<TargetSpec>,
    formats: Vec<OutputFormat>,
}

impl Profiles {
    pub fn new(targets: Vec<TargetSpec>, formats: Vec<OutputFormat>) -> Result<Self, ProfileError> {
        if targets.is_empty() {
            return Err(ProfileError::Empty("resolution"));
        }
        if formats.is_empty() {
            return Err(ProfileError::Empty("format"));
        }
        for (i, target) in targets.iter().enumerate() {
            if targets[..i].iter().any(|t| t.label == target.label) {
                return Err(ProfileError::DuplicateLabel(target.label.clone()));
            }
        }
        // One artifact key per (label, extension)
        for (i, format) in formats.iter().enumerate() {
            if formats[..i].iter().any(|f| f.kind() == format.kind()) {
                return Err(ProfileError::DuplicateFormat(format.kind()));
            }
        }
        Ok(Self { targets, formats })
    }

    /// 1080p, 720p and 480p, each as JPEG then WebP.
    pub fn standard() -> Self {
        let target = |label: &str, width, height| TargetSpec {
            label: label.to_string(),
            width,
            height,
        };
        Self {
            targets: vec![
                target("1080p", 1920, 1080),
                target("720p", 1280, 720),
                target("480p", 854, 480),
            ],
            formats: vec![OutputFormat::jpeg(), OutputFormat::webp()],
        }
    }

    pub fn targets(&self) -> &[TargetSpec] {
        &self.targets
    }

    pub fn formats(&self) -> &[OutputFormat] {
        &self.formats
    }

    /// Number of artifacts one successful invocation writes.
    pub fn artifact_count(&self) -> usize {
        self.targets.len() * self.formats.len()
    }
}

impl Default for Profiles {
    fn default() -> Self {
        Self::standard()
    }
}
