//! Image processing: decode, exact resize, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` (format sniffed from content) |
//! | **Resize** | Lanczos3, forced to the target dimensions |
//! | **Encode → JPEG** | `mozjpeg` |
//! | **Encode → WebP** | `webp` (libwebp) |
//!
//! The module is split into:
//! - **Parameters**: Resolution and format profiles ([`TargetSpec`], [`OutputFormat`], [`Profiles`])
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, DecodedImage, Dimensions, ImageBackend, RenderedVariant};
pub use params::{FormatKind, OutputFormat, ProfileError, Profiles, Quality, TargetSpec};
pub use rust_backend::RustBackend;
