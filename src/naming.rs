//! Object-key naming: trigger keys in, artifact keys out.
//!
//! Every artifact lands at `{resolution_label}/{source_name}.{ext}` where
//! `source_name` is the triggering object's basename with its final
//! extension removed. Keys are a pure function of (source key, label,
//! format), so reprocessing the same object overwrites the same artifacts.
//!
//! - `uploads/2024/photo.png` → source name `photo` → `720p/photo.webp`
//! - `archive.tar.gz` → `archive.tar` → `480p/archive.tar.jpg`
//! - `.hidden` → `.hidden` (a leading dot is not an extension)

use crate::imaging::{OutputFormat, Profiles, TargetSpec};
use percent_encoding::percent_decode_str;

/// Decode an object key as delivered in a storage notification.
///
/// Notifications use form encoding: `+` is a space and `%XX` is a byte.
/// Invalid UTF-8 after decoding is replaced rather than rejected.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Basename of a key with its final extension stripped.
///
/// Dots that only lead the basename do not start an extension, so
/// `.profile` and `..png` are returned whole.
pub fn source_name(key: &str) -> &str {
    let base = key.rsplit('/').next().unwrap_or(key);
    match base.rfind('.') {
        Some(dot) if base[..dot].chars().any(|c| c != '.') => &base[..dot],
        _ => base,
    }
}

/// Destination key for one (resolution, format) artifact.
pub fn artifact_key(target: &TargetSpec, name: &str, format: &OutputFormat) -> String {
    format!("{}/{}.{}", target.label(), name, format.extension())
}

/// All artifact keys for a source name, in canonical (target, format) order.
pub fn artifact_keys(name: &str, profiles: &Profiles) -> Vec<String> {
    profiles
        .targets()
        .iter()
        .flat_map(|target| {
            profiles
                .formats()
                .iter()
                .map(move |format| artifact_key(target, name, format))
        })
        .collect()
}
