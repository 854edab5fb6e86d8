//! The transcode pipeline: one source in, a resolution × format matrix out.
//!
//! ## Flow
//!
//! ```text
//! SourceImage ──decode──▶ DecodedImage
//!                           ├─resize─▶ 1080p ─┬─encode─▶ put 1080p/photo.jpg
//!                           │                 └─encode─▶ put 1080p/photo.webp
//!                           ├─resize─▶ 720p  ─┬─ …
//!                           └─resize─▶ 480p  ─┴─ …
//! ```
//!
//! The source is decoded once. Each resolution is rendered once and every
//! format is encoded from that rendering, so a resize always finishes before
//! any of its encodes start. Nothing else is ordered: resolutions (and the
//! formats within one) run on the rayon pool when
//! [`ProcessOptions::parallel`] is set.
//!
//! ## Failure policy
//!
//! A decode failure aborts before anything is written. After that,
//! [`FailurePolicy::FailFast`] stops scheduling work at the first failed
//! encode or upload, while [`FailurePolicy::BestEffort`] finishes every
//! branch and reports all failures together. Either way, artifacts already
//! written stay written.
//!
//! ## Events
//!
//! Stage boundaries are reported as [`ProcessEvent`]s on an optional channel
//! so callers can render progress without the pipeline doing any I/O of its
//! own beyond the store.

use crate::imaging::{
    BackendError, DecodedImage, FormatKind, ImageBackend, OutputFormat, Profiles, RenderedVariant,
    TargetSpec,
};
use crate::naming;
use crate::store::{ObjectStore, StoreError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to decode {source_key}: {error}")]
    Decode {
        source_key: String,
        #[source]
        error: BackendError,
    },
    #[error("Failed to render {source_key} at {label}: {error}")]
    Render {
        source_key: String,
        label: String,
        #[source]
        error: BackendError,
    },
    #[error("Failed to encode {key} ({format}) from {source_key}: {error}")]
    Encode {
        source_key: String,
        label: String,
        format: FormatKind,
        key: String,
        #[source]
        error: BackendError,
    },
    #[error("Failed to store {key} ({format}) from {source_key}: {error}")]
    Publish {
        source_key: String,
        label: String,
        format: FormatKind,
        key: String,
        #[source]
        error: StoreError,
    },
    #[error("{} of {total} artifacts failed for {source_key}", .failures.len())]
    Partial {
        source_key: String,
        total: usize,
        stored: Vec<StoredArtifact>,
        failures: Vec<ProcessError>,
    },
}

impl ProcessError {
    /// Whether re-driving the same source could succeed.
    ///
    /// Only storage failures are transient; decode and encode failures will
    /// repeat for the same bytes, and a rejected bucket or key name will be
    /// rejected again.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Publish { error, .. } => !matches!(error, StoreError::InvalidName { .. }),
            Self::Partial { failures, .. } => failures.iter().all(Self::is_retriable),
            Self::Decode { .. } | Self::Render { .. } | Self::Encode { .. } => false,
        }
    }
}

/// Raw bytes of the triggering object plus the name its artifacts use.
#[derive(Debug, Clone)]
pub struct SourceImage {
    key: String,
    name: String,
    bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        let key = key.into();
        let name = naming::source_name(&key).to_string();
        Self { key, name, bytes }
    }

    /// The object key the source was read from.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Basename without extension; the stem of every artifact key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// One artifact successfully written to the destination bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub key: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub content_type: &'static str,
    pub size_bytes: usize,
}

/// Progress events emitted at each stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    DecodeStarted {
        source_key: String,
        size_bytes: usize,
    },
    DecodeFinished {
        source_key: String,
        width: u32,
        height: u32,
    },
    VariantRendered {
        label: String,
        width: u32,
        height: u32,
    },
    ArtifactStored {
        key: String,
        content_type: &'static str,
        size_bytes: usize,
    },
    ArtifactFailed {
        key: String,
        error: String,
    },
}

/// What to do with the rest of the matrix once one artifact fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failure.
    #[default]
    FailFast,
    /// Finish every independent branch, then report all failures.
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    pub parallel: bool,
    pub on_error: FailurePolicy,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            on_error: FailurePolicy::FailFast,
        }
    }
}

/// Runs the transcode matrix for one source against one destination bucket.
pub struct Transcoder<'a, B: ImageBackend, S: ObjectStore> {
    backend: &'a B,
    store: &'a S,
    profiles: &'a Profiles,
    bucket: &'a str,
    options: ProcessOptions,
    events: Option<Sender<ProcessEvent>>,
}

impl<'a, B: ImageBackend, S: ObjectStore> Transcoder<'a, B, S> {
    pub fn new(backend: &'a B, store: &'a S, profiles: &'a Profiles, bucket: &'a str) -> Self {
        Self {
            backend,
            store,
            profiles,
            bucket,
            options: ProcessOptions::default(),
            events: None,
        }
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: Sender<ProcessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            tx.send(event).ok();
        }
    }

    /// Decode, render and publish every artifact for `source`.
    ///
    /// Returns the stored artifacts in canonical (target, format) order.
    pub fn run(&self, source: &SourceImage) -> Result<Vec<StoredArtifact>, ProcessError> {
        self.emit(ProcessEvent::DecodeStarted {
            source_key: source.key().to_string(),
            size_bytes: source.bytes().len(),
        });
        let decoded = self
            .backend
            .decode(source.bytes())
            .map_err(|error| ProcessError::Decode {
                source_key: source.key().to_string(),
                error,
            })?;
        let dims = decoded.dimensions();
        tracing::debug!(
            source = source.key(),
            width = dims.width,
            height = dims.height,
            "decoded source"
        );
        self.emit(ProcessEvent::DecodeFinished {
            source_key: source.key().to_string(),
            width: dims.width,
            height: dims.height,
        });

        match self.options.on_error {
            FailurePolicy::FailFast => self.run_fail_fast(source, &decoded),
            FailurePolicy::BestEffort => self.run_best_effort(source, &decoded),
        }
    }

    fn run_fail_fast(
        &self,
        source: &SourceImage,
        decoded: &DecodedImage,
    ) -> Result<Vec<StoredArtifact>, ProcessError> {
        let per_target = self.try_map(self.profiles.targets(), |target| {
            let variant = self.render(source, decoded, target)?;
            self.try_map(self.profiles.formats(), |format| {
                self.publish(source, &variant, format)
            })
        })?;
        Ok(per_target.into_iter().flatten().collect())
    }

    fn run_best_effort(
        &self,
        source: &SourceImage,
        decoded: &DecodedImage,
    ) -> Result<Vec<StoredArtifact>, ProcessError> {
        let outcomes: Vec<Result<StoredArtifact, ProcessError>> =
            self.map_all(self.profiles.targets(), |target| {
                match self.render(source, decoded, target) {
                    Ok(variant) => self.map_all(self.profiles.formats(), |format| {
                        vec![self.publish(source, &variant, format)]
                    }),
                    Err(e) => vec![Err(e)],
                }
            });

        let mut stored = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(artifact) => stored.push(artifact),
                Err(e) => failures.push(e),
            }
        }

        if failures.is_empty() {
            Ok(stored)
        } else {
            Err(ProcessError::Partial {
                source_key: source.key().to_string(),
                total: self.profiles.artifact_count(),
                stored,
                failures,
            })
        }
    }

    /// Map over `items`, stopping at the first error. Order is preserved.
    fn try_map<T, U, F>(&self, items: &[T], f: F) -> Result<Vec<U>, ProcessError>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U, ProcessError> + Sync + Send,
    {
        if self.options.parallel {
            items.par_iter().map(f).collect()
        } else {
            items.iter().map(f).collect()
        }
    }

    /// Map over every item of `items` and flatten. Order is preserved.
    fn map_all<T, U, F>(&self, items: &[T], f: F) -> Vec<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Vec<U> + Sync + Send,
    {
        if self.options.parallel {
            items.par_iter().flat_map_iter(f).collect()
        } else {
            items.iter().flat_map(f).collect()
        }
    }

    fn render(
        &self,
        source: &SourceImage,
        decoded: &DecodedImage,
        target: &TargetSpec,
    ) -> Result<RenderedVariant, ProcessError> {
        let variant = self
            .backend
            .resize(decoded, target)
            .map_err(|error| ProcessError::Render {
                source_key: source.key().to_string(),
                label: target.label().to_string(),
                error,
            })?;
        let dims = variant.dimensions();
        self.emit(ProcessEvent::VariantRendered {
            label: target.label().to_string(),
            width: dims.width,
            height: dims.height,
        });
        Ok(variant)
    }

    /// Encode one variant in one format and write it to the destination.
    pub fn publish(
        &self,
        source: &SourceImage,
        variant: &RenderedVariant,
        format: &OutputFormat,
    ) -> Result<StoredArtifact, ProcessError> {
        let target = variant.target();
        let key = naming::artifact_key(target, source.name(), format);

        let result = self
            .backend
            .encode(variant, format)
            .map_err(|error| ProcessError::Encode {
                source_key: source.key().to_string(),
                label: target.label().to_string(),
                format: format.kind(),
                key: key.clone(),
                error,
            })
            .and_then(|body| {
                self.store
                    .put(self.bucket, &key, &body, format.content_type())
                    .map(|()| body.len())
                    .map_err(|error| ProcessError::Publish {
                        source_key: source.key().to_string(),
                        label: target.label().to_string(),
                        format: format.kind(),
                        key: key.clone(),
                        error,
                    })
            });

        match result {
            Ok(size_bytes) => {
                tracing::debug!(bucket = self.bucket, key, size_bytes, "artifact stored");
                self.emit(ProcessEvent::ArtifactStored {
                    key: key.clone(),
                    content_type: format.content_type(),
                    size_bytes,
                });
                let dims = variant.dimensions();
                Ok(StoredArtifact {
                    key,
                    label: target.label().to_string(),
                    width: dims.width,
                    height: dims.height,
                    content_type: format.content_type(),
                    size_bytes,
                })
            }
            Err(e) => {
                tracing::warn!(bucket = self.bucket, key, error = %e, "artifact failed");
                self.emit(ProcessEvent::ArtifactFailed {
                    key,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{OutputFormat, Quality, TargetSpec};
    use crate::store::{FileSystemStore, MemoryStore};
    use std::sync::mpsc;

    fn small_profiles() -> Profiles {
        Profiles::new(
            vec![
                TargetSpec::new("large", 32, 18).unwrap(),
                TargetSpec::new("small", 16, 9).unwrap(),
            ],
            vec![OutputFormat::jpeg(), OutputFormat::webp()],
        )
        .unwrap()
    }

    fn sequential(on_error: FailurePolicy) -> ProcessOptions {
        ProcessOptions {
            parallel: false,
            on_error,
        }
    }

    #[test]
    fn source_image_derives_name_from_key() {
        let source = SourceImage::new("uploads/photo.png", vec![1]);
        assert_eq!(source.key(), "uploads/photo.png");
        assert_eq!(source.name(), "photo");
    }

    #[test]
    fn standard_profiles_write_six_canonical_keys() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = Profiles::standard();
        let source = SourceImage::new("photo.png", b"png".to_vec());

        let artifacts = Transcoder::new(&backend, &store, &profiles, "out")
            .run(&source)
            .unwrap();

        let keys: Vec<&str> = artifacts.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "1080p/photo.jpg",
                "1080p/photo.webp",
                "720p/photo.jpg",
                "720p/photo.webp",
                "480p/photo.jpg",
                "480p/photo.webp",
            ]
        );
        assert_eq!(store.put_count(), 6);
        assert_eq!(store.keys("out").len(), 6);
    }

    #[test]
    fn artifacts_carry_content_type_and_dimensions() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());

        let artifacts = Transcoder::new(&backend, &store, &profiles, "out")
            .run(&source)
            .unwrap();

        assert_eq!(artifacts[0].content_type, "image/jpeg");
        assert_eq!(artifacts[1].content_type, "image/webp");
        assert_eq!((artifacts[0].width, artifacts[0].height), (32, 18));
        assert_eq!((artifacts[3].width, artifacts[3].height), (16, 9));
        assert_eq!(
            store.object("out", "small/a.webp").unwrap().content_type,
            "image/webp"
        );
    }

    #[test]
    fn sequential_run_decodes_once_and_renders_before_encoding() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());

        Transcoder::new(&backend, &store, &profiles, "out")
            .with_options(sequential(FailurePolicy::FailFast))
            .run(&source)
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1 + 2 + 4);
        assert_eq!(ops[0], RecordedOp::Decode { size_bytes: 3 });
        assert!(matches!(&ops[1], RecordedOp::Resize { label, .. } if label == "large"));
        assert!(matches!(
            &ops[2],
            RecordedOp::Encode {
                label,
                format: OutputFormat::Jpeg { quality: Quality(85), optimize: true },
            } if label == "large"
        ));
        assert!(matches!(
            &ops[3],
            RecordedOp::Encode {
                label,
                format: OutputFormat::WebP { quality: Quality(85), method: 6 },
            } if label == "large"
        ));
        assert!(matches!(&ops[4], RecordedOp::Resize { label, .. } if label == "small"));
    }

    #[test]
    fn parallel_run_preserves_canonical_order() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = Profiles::standard();
        let source = SourceImage::new("photo.png", b"png".to_vec());

        let artifacts = Transcoder::new(&backend, &store, &profiles, "out")
            .with_options(ProcessOptions {
                parallel: true,
                on_error: FailurePolicy::FailFast,
            })
            .run(&source)
            .unwrap();

        let keys: Vec<String> = artifacts.into_iter().map(|a| a.key).collect();
        assert_eq!(keys, naming::artifact_keys("photo", &profiles));

        // Every encode for a label comes after that label's resize
        let ops = backend.get_operations();
        for (i, op) in ops.iter().enumerate() {
            if let RecordedOp::Encode { label, .. } = op {
                assert!(
                    ops[..i].iter().any(
                        |prev| matches!(prev, RecordedOp::Resize { label: l, .. } if l == label)
                    ),
                    "encode for {label} before its resize"
                );
            }
        }
    }

    #[test]
    fn decode_failure_writes_nothing() {
        let backend = MockBackend::failing_decode();
        let store = MemoryStore::new();
        let profiles = small_profiles();
        let source = SourceImage::new("broken.png", b"nope".to_vec());

        let err = Transcoder::new(&backend, &store, &profiles, "out")
            .run(&source)
            .unwrap_err();

        assert!(matches!(err, ProcessError::Decode { .. }));
        assert!(!err.is_retriable());
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn fail_fast_stops_after_first_failed_upload() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        store.fail_puts_to("large/a.webp");
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());

        let err = Transcoder::new(&backend, &store, &profiles, "out")
            .with_options(sequential(FailurePolicy::FailFast))
            .run(&source)
            .unwrap_err();

        match &err {
            ProcessError::Publish {
                source_key,
                label,
                format,
                key,
                ..
            } => {
                assert_eq!(source_key, "a.png");
                assert_eq!(label, "large");
                assert_eq!(*format, FormatKind::WebP);
                assert_eq!(key, "large/a.webp");
            }
            other => panic!("expected publish error, got {other:?}"),
        }
        assert!(err.is_retriable());
        // The JPEG written before the failure is kept; nothing after it runs
        assert_eq!(store.keys("out"), vec!["large/a.jpg"]);
        assert_eq!(store.put_count(), 2);
    }

    #[test]
    fn best_effort_finishes_independent_branches() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        store.fail_puts_to("large/a.webp");
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());

        let err = Transcoder::new(&backend, &store, &profiles, "out")
            .with_options(sequential(FailurePolicy::BestEffort))
            .run(&source)
            .unwrap_err();

        match &err {
            ProcessError::Partial {
                total,
                stored,
                failures,
                ..
            } => {
                assert_eq!(*total, 4);
                assert_eq!(stored.len(), 3);
                assert_eq!(failures.len(), 1);
            }
            other => panic!("expected partial error, got {other:?}"),
        }
        assert!(err.is_retriable());
        assert_eq!(store.put_count(), 4);
        assert_eq!(store.keys("out").len(), 3);
        assert!(err.to_string().starts_with("1 of 4 artifacts failed for a.png"));
    }

    #[test]
    fn rejected_store_names_are_not_retriable() {
        let backend = MockBackend::new();
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileSystemStore::new(tmp.path());
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());

        for on_error in [FailurePolicy::FailFast, FailurePolicy::BestEffort] {
            let err = Transcoder::new(&backend, &store, &profiles, ".out")
                .with_options(sequential(on_error))
                .run(&source)
                .unwrap_err();
            assert!(!err.is_retriable(), "{on_error:?}: {err}");
        }

        let publish = ProcessError::Publish {
            source_key: "a.png".into(),
            label: "large".into(),
            format: FormatKind::Jpeg,
            key: "large/a.jpg".into(),
            error: StoreError::InvalidName {
                what: "key",
                value: "../a.jpg".into(),
                reason: "must not contain '.' or '..' segments",
            },
        };
        assert!(!publish.is_retriable());
    }

    #[test]
    fn best_effort_success_returns_everything() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());

        let artifacts = Transcoder::new(&backend, &store, &profiles, "out")
            .with_options(ProcessOptions {
                parallel: true,
                on_error: FailurePolicy::BestEffort,
            })
            .run(&source)
            .unwrap();
        assert_eq!(artifacts.len(), 4);
    }

    #[test]
    fn rerun_overwrites_same_keys() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = small_profiles();
        let source = SourceImage::new("a.png", b"png".to_vec());
        let transcoder = Transcoder::new(&backend, &store, &profiles, "out");

        let first = transcoder.run(&source).unwrap();
        let second = transcoder.run(&source).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.put_count(), 8);
        assert_eq!(store.keys("out").len(), 4);
    }

    #[test]
    fn emits_stage_events() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        let profiles = Profiles::new(
            vec![TargetSpec::new("only", 4, 4).unwrap()],
            vec![OutputFormat::jpeg()],
        )
        .unwrap();
        let source = SourceImage::new("x.png", b"png".to_vec());
        let (tx, rx) = mpsc::channel();

        Transcoder::new(&backend, &store, &profiles, "out")
            .with_events(tx)
            .run(&source)
            .unwrap();

        let events: Vec<ProcessEvent> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                ProcessEvent::DecodeStarted {
                    source_key: "x.png".to_string(),
                    size_bytes: 3
                },
                ProcessEvent::DecodeFinished {
                    source_key: "x.png".to_string(),
                    width: 8,
                    height: 6
                },
                ProcessEvent::VariantRendered {
                    label: "only".to_string(),
                    width: 4,
                    height: 4
                },
                ProcessEvent::ArtifactStored {
                    key: "only/x.jpg".to_string(),
                    content_type: "image/jpeg",
                    size_bytes: "jpg:only".len()
                },
            ]
        );
    }

    #[test]
    fn failed_upload_emits_failure_event() {
        let backend = MockBackend::new();
        let store = MemoryStore::new();
        store.fail_puts_to("only/x.jpg");
        let profiles = Profiles::new(
            vec![TargetSpec::new("only", 4, 4).unwrap()],
            vec![OutputFormat::jpeg()],
        )
        .unwrap();
        let source = SourceImage::new("x.png", b"png".to_vec());
        let (tx, rx) = mpsc::channel();

        let _ = Transcoder::new(&backend, &store, &profiles, "out")
            .with_events(tx)
            .run(&source);

        let last = rx.iter().last().unwrap();
        assert!(matches!(last, ProcessEvent::ArtifactFailed { key, .. } if key == "only/x.jpg"));
    }
}
