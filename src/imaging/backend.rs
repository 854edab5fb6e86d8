//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend must
//! support: decode, resize, and encode. Keeping them separate lets the
//! orchestration decode a source once, render each resolution once, and
//! encode every format from that one rendering.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{FormatKind, OutputFormat, TargetSpec};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Not a decodable image: {0}")]
    Decode(String),
    #[error("Resize failed: {0}")]
    Resize(String),
    #[error("{format} encode failed: {message}")]
    Encode { format: FormatKind, message: String },
}

/// Pixel dimensions of a decoded or rendered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A source image decoded and normalized to 8-bit RGB.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbImage,
}

impl DecodedImage {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = self.pixels.dimensions();
        Dimensions { width, height }
    }
}

/// A decoded source resized to exactly one [`TargetSpec`].
#[derive(Debug, Clone)]
pub struct RenderedVariant {
    target: TargetSpec,
    pixels: RgbImage,
}

impl RenderedVariant {
    pub fn new(target: TargetSpec, pixels: RgbImage) -> Self {
        Self { target, pixels }
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> Dimensions {
        let (width, height) = self.pixels.dimensions();
        Dimensions { width, height }
    }
}

/// Trait for image processing backends.
///
/// `Sync` so one backend can serve every rayon worker of an invocation.
pub trait ImageBackend: Sync {
    /// Decode raw bytes, detecting the format from content.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError>;

    /// Resize to exactly the target's dimensions.
    fn resize(
        &self,
        source: &DecodedImage,
        target: &TargetSpec,
    ) -> Result<RenderedVariant, BackendError>;

    /// Serialize a rendered variant with the format's parameters.
    fn encode(
        &self,
        variant: &RenderedVariant,
        format: &OutputFormat,
    ) -> Result<Vec<u8>, BackendError>;
}
