//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Handle
//!
//! ```text
//! Source uploads/photo.png (2.1 MB)
//!     Decoded: 4032x3024
//!     1080p: 1920x1080
//!         1080p/photo.jpg  image/jpeg  412.0 KB
//!         1080p/photo.webp  image/webp  298.3 KB
//!     720p: 1280x720
//!         ...
//! Success: 6 artifacts
//! ```
//!
//! Under parallel processing the rendered/stored lines of different
//! resolutions interleave in completion order; the final key list is always
//! canonical.
//!
//! ## Status
//!
//! ```text
//! uploads/photo.png
//!     Original: present
//!     1080p/photo.jpg: present
//!     1080p/photo.webp: missing
//! 5 of 6 artifacts present
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::handler::InvocationResult;
use crate::process::ProcessEvent;
use crate::status::StatusReport;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte size with one decimal above 1 KB.
fn human_bytes(size: usize) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn presence(exists: bool) -> &'static str {
    if exists { "present" } else { "missing" }
}

// ============================================================================
// Handle output
// ============================================================================

/// Format a single pipeline progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::DecodeStarted {
            source_key,
            size_bytes,
        } => vec![format!("Source {} ({})", source_key, human_bytes(*size_bytes))],
        ProcessEvent::DecodeFinished { width, height, .. } => {
            vec![format!("{}Decoded: {}x{}", indent(1), width, height)]
        }
        ProcessEvent::VariantRendered {
            label,
            width,
            height,
        } => vec![format!("{}{}: {}x{}", indent(1), label, width, height)],
        ProcessEvent::ArtifactStored {
            key,
            content_type,
            size_bytes,
        } => vec![format!(
            "{}{}  {}  {}",
            indent(2),
            key,
            content_type,
            human_bytes(*size_bytes)
        )],
        ProcessEvent::ArtifactFailed { key, error } => {
            vec![
                format!("{}{}  FAILED", indent(2), key),
                format!("{}{}", indent(3), error),
            ]
        }
    }
}

/// Summary lines for a finished invocation.
pub fn format_invocation(result: &InvocationResult) -> Vec<String> {
    if result.is_success() {
        let noun = if result.keys.len() == 1 {
            "artifact"
        } else {
            "artifacts"
        };
        vec![format!("Success: {} {}", result.keys.len(), noun)]
    } else {
        let mut lines = vec![format!("Failed ({}): {}", result.status_code, result.body)];
        if !result.keys.is_empty() {
            lines.push(format!("{}Written before failure:", indent(1)));
            lines.extend(result.keys.iter().map(|k| format!("{}{}", indent(2), k)));
        }
        lines
    }
}

pub fn print_invocation(result: &InvocationResult) {
    for line in format_invocation(result) {
        println!("{}", line);
    }
}

// ============================================================================
// Status output
// ============================================================================

/// Format a status report: original first, then every expected artifact.
pub fn format_status_report(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        report.source_key.clone(),
        format!("{}Original: {}", indent(1), presence(report.original_exists)),
    ];
    for artifact in &report.artifacts {
        lines.push(format!(
            "{}{}: {}",
            indent(1),
            artifact.key,
            presence(artifact.exists)
        ));
    }
    lines.push(format!(
        "{} of {} artifacts present",
        report.present(),
        report.artifacts.len()
    ));
    lines
}

pub fn print_status_report(report: &StatusReport) {
    for line in format_status_report(report) {
        println!("{}", line);
    }
}

/// One artifact key per line.
pub fn print_keys(keys: &[String]) {
    for key in keys {
        println!("{}", key);
    }
}
