//! Which artifacts exist for a source object.
//!
//! Given the original key, checks the source in the input bucket and every
//! expected `{label}/{name}.{ext}` in the output bucket. Useful after an
//! invocation to see what a partial failure left behind.

use crate::imaging::{FormatKind, Profiles};
use crate::naming;
use crate::store::{ObjectStore, StoreError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPresence {
    pub label: String,
    pub format: FormatKind,
    pub key: String,
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub source_key: String,
    pub original_exists: bool,
    /// One entry per (resolution, format), in canonical order.
    pub artifacts: Vec<ArtifactPresence>,
}

impl StatusReport {
    pub fn present(&self) -> usize {
        self.artifacts.iter().filter(|a| a.exists).count()
    }

    pub fn is_complete(&self) -> bool {
        self.artifacts.iter().all(|a| a.exists)
    }
}

/// Check the original and every expected artifact for `source_key`.
pub fn check_status<S: ObjectStore>(
    store: &S,
    profiles: &Profiles,
    input_bucket: &str,
    output_bucket: &str,
    source_key: &str,
) -> Result<StatusReport, StoreError> {
    let original_exists = store.exists(input_bucket, source_key)?;
    let name = naming::source_name(source_key);

    let mut artifacts = Vec::with_capacity(profiles.artifact_count());
    for target in profiles.targets() {
        for format in profiles.formats() {
            let key = naming::artifact_key(target, name, format);
            let exists = store.exists(output_bucket, &key)?;
            tracing::debug!(bucket = output_bucket, key, exists, "checked artifact");
            artifacts.push(ArtifactPresence {
                label: target.label().to_string(),
                format: format.kind(),
                key,
                exists,
            });
        }
    }

    Ok(StatusReport {
        source_key: source_key.to_string(),
        original_exists,
        artifacts,
    })
}
