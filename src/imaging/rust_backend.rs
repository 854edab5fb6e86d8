//! Production image backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image::ImageReader` with content sniffing |
//! | Normalize | `DynamicImage::to_rgb8` (alpha dropped, palette/gray/16-bit expanded) |
//! | Resize | `image::imageops::resize` with `Lanczos3`, exact target dimensions |
//! | Encode → JPEG | `mozjpeg` with optional Huffman optimization |
//! | Encode → WebP | `webp` (libwebp) lossy with explicit method |
//!
//! Both C encoders signal some failures by unwinding, so each encode runs
//! under [`std::panic::catch_unwind`] and a panic becomes a
//! [`BackendError::Encode`].

use super::backend::{BackendError, DecodedImage, ImageBackend, RenderedVariant};
use super::params::{FormatKind, OutputFormat, TargetSpec};
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use std::io::Cursor;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Backend built on `image`, `mozjpeg` and `webp`.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Run an encoder, converting an unwinding failure into an error.
fn guard_encode<F>(format: FormatKind, encode: F) -> Result<Vec<u8>, BackendError>
where
    F: FnOnce() -> Result<Vec<u8>, BackendError>,
{
    catch_unwind(AssertUnwindSafe(encode)).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| panic.downcast_ref::<&str>().copied())
            .unwrap_or("encoder panicked");
        Err(BackendError::Encode {
            format,
            message: message.to_string(),
        })
    })
}

fn encode_jpeg(rgb: &RgbImage, quality: u32, optimize: bool) -> Result<Vec<u8>, BackendError> {
    guard_encode(FormatKind::Jpeg, || {
        let err = |stage: &str, e: std::io::Error| BackendError::Encode {
            format: FormatKind::Jpeg,
            message: format!("mozjpeg: failed to {stage}: {e}"),
        };
        let (w, h) = rgb.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_quality(quality as f32);
        comp.set_optimize_coding(optimize);

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut writer = comp
            .start_compress(Vec::with_capacity(estimated_size))
            .map_err(|e| err("start compress", e))?;
        writer
            .write_scanlines(rgb.as_raw())
            .map_err(|e| err("write scanlines", e))?;
        writer.finish().map_err(|e| err("finish", e))
    })
}

fn encode_webp(rgb: &RgbImage, quality: u32, method: u8) -> Result<Vec<u8>, BackendError> {
    guard_encode(FormatKind::WebP, || {
        let (w, h) = rgb.dimensions();
        let encoder = webp::Encoder::from_rgb(rgb.as_raw(), w, h);

        let mut config = webp::WebPConfig::new().map_err(|_| BackendError::Encode {
            format: FormatKind::WebP,
            message: "failed to initialize WebPConfig".to_string(),
        })?;
        config.lossless = 0;
        config.quality = quality as f32;
        config.method = i32::from(method.min(OutputFormat::MAX_WEBP_METHOD));

        let mem = encoder
            .encode_advanced(&config)
            .map_err(|e| BackendError::Encode {
                format: FormatKind::WebP,
                message: format!("libwebp: {e:?}"),
            })?;
        Ok(mem.to_vec())
    })
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, BackendError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        if reader.format().is_none() {
            return Err(BackendError::Decode(
                "unrecognized image signature".to_string(),
            ));
        }
        let img = reader
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(DecodedImage::new(img.to_rgb8()))
    }

    fn resize(
        &self,
        source: &DecodedImage,
        target: &TargetSpec,
    ) -> Result<RenderedVariant, BackendError> {
        let (width, height) = target.dimensions();
        if width == 0 || height == 0 {
            return Err(BackendError::Resize(format!(
                "target {} has a zero dimension",
                target.label()
            )));
        }
        let resized = image::imageops::resize(source.pixels(), width, height, FilterType::Lanczos3);
        Ok(RenderedVariant::new(target.clone(), resized))
    }

    fn encode(
        &self,
        variant: &RenderedVariant,
        format: &OutputFormat,
    ) -> Result<Vec<u8>, BackendError> {
        match *format {
            OutputFormat::Jpeg { quality, optimize } => {
                encode_jpeg(variant.pixels(), quality.value(), optimize)
            }
            OutputFormat::WebP { quality, method } => {
                encode_webp(variant.pixels(), quality.value(), method)
            }
        }
    }
}
