//! Invocation entry point.
//!
//! One invocation = one storage notification = one source object. The
//! handler checks configuration, reads the source, runs the [`Transcoder`]
//! and folds the outcome into an [`InvocationResult`]:
//!
//! ```text
//! notification JSON ─▶ TriggerRecord ─▶ output bucket? ─▶ profiles ─▶ get source
//!                                           │ no             │ bad       │
//!                                           ▼                ▼           ▼
//!                                          500              500      Transcoder::run
//! ```
//!
//! Configuration is checked before the store is touched, so a misconfigured
//! deployment fails every invocation without reading or writing anything.

use crate::config::{ConfigError, HandlerConfig};
use crate::event::{EventError, EventNotification, TriggerRecord};
use crate::imaging::{ImageBackend, ProfileError};
use crate::process::{ProcessError, ProcessEvent, SourceImage, StoredArtifact, Transcoder};
use crate::store::{ObjectStore, StoreError};
use serde::Serialize;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Configuration(ConfigError),
    #[error(transparent)]
    UnsupportedFormat(ProfileError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error("Invalid source key {key:?}: {reason}")]
    InvalidSourceKey { key: String, reason: &'static str },
    #[error("Failed to read source {bucket}/{key}: {error}")]
    Source {
        bucket: String,
        key: String,
        #[source]
        error: StoreError,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl From<ConfigError> for HandlerError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e)
    }
}

impl From<ProfileError> for HandlerError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::UnsupportedFormat(_) => Self::UnsupportedFormat(e),
            other => Self::Configuration(ConfigError::Validation(other.to_string())),
        }
    }
}

impl HandlerError {
    /// HTTP-style status reported in the [`InvocationResult`].
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Event(_) | Self::InvalidSourceKey { .. } => 400,
            Self::Process(ProcessError::Decode { .. }) => 422,
            Self::Configuration(_)
            | Self::UnsupportedFormat(_)
            | Self::Source { .. }
            | Self::Process(_) => 500,
        }
    }

    /// Whether re-delivering the same notification could succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Source { error, .. } => !matches!(
                error,
                StoreError::NotFound { .. } | StoreError::InvalidName { .. }
            ),
            Self::Process(e) => e.is_retriable(),
            Self::Configuration(_)
            | Self::UnsupportedFormat(_)
            | Self::Event(_)
            | Self::InvalidSourceKey { .. } => false,
        }
    }
}

/// The observable outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
    /// Keys written, in canonical order. Omitted when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl InvocationResult {
    pub fn success(artifacts: &[StoredArtifact]) -> Self {
        Self {
            status_code: 200,
            body: "Success".to_string(),
            keys: artifacts.iter().map(|a| a.key.clone()).collect(),
        }
    }

    pub fn failure(error: &HandlerError) -> Self {
        let keys = match error {
            HandlerError::Process(ProcessError::Partial { stored, .. }) => {
                stored.iter().map(|a| a.key.clone()).collect()
            }
            _ => Vec::new(),
        };
        Self {
            status_code: error.status_code(),
            body: error.to_string(),
            keys,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

pub struct Handler<B: ImageBackend, S: ObjectStore> {
    config: HandlerConfig,
    backend: B,
    store: S,
}

impl<B: ImageBackend, S: ObjectStore> Handler<B, S> {
    pub fn new(config: HandlerConfig, backend: B, store: S) -> Self {
        Self {
            config,
            backend,
            store,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Transcode the object named by `trigger` into every configured
    /// (resolution, format) artifact.
    pub fn handle(
        &self,
        trigger: &TriggerRecord,
        events: Option<Sender<ProcessEvent>>,
    ) -> Result<Vec<StoredArtifact>, HandlerError> {
        let output_bucket = self.config.require_output_bucket()?;
        let profiles = self.config.profiles()?;

        let key = &trigger.object_key;
        if crate::naming::source_name(key).is_empty() {
            return Err(HandlerError::InvalidSourceKey {
                key: key.clone(),
                reason: "has no file name",
            });
        }

        tracing::info!(
            bucket = trigger.bucket_name.as_str(),
            key,
            output_bucket,
            "processing source"
        );
        let bytes = self
            .store
            .get(&trigger.bucket_name, key)
            .map_err(|error| HandlerError::Source {
                bucket: trigger.bucket_name.clone(),
                key: key.clone(),
                error,
            })?;
        let source = SourceImage::new(key.clone(), bytes);

        let mut transcoder = Transcoder::new(&self.backend, &self.store, &profiles, output_bucket)
            .with_options(self.config.process_options());
        if let Some(tx) = events {
            transcoder = transcoder.with_events(tx);
        }
        let artifacts = transcoder.run(&source)?;

        tracing::info!(key, artifacts = artifacts.len(), "processed source");
        Ok(artifacts)
    }

    /// Parse a notification and handle its first record.
    pub fn handle_event(
        &self,
        json: &str,
        events: Option<Sender<ProcessEvent>>,
    ) -> Result<Vec<StoredArtifact>, HandlerError> {
        let trigger = EventNotification::from_json(json)?.trigger()?;
        self.handle(&trigger, events)
    }

    /// [`handle_event`](Self::handle_event), reported as an
    /// [`InvocationResult`] instead of a `Result`.
    pub fn invoke(&self, json: &str, events: Option<Sender<ProcessEvent>>) -> InvocationResult {
        match self.handle_event(json, events) {
            Ok(artifacts) => InvocationResult::success(&artifacts),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    status = e.status_code(),
                    retriable = e.is_retriable(),
                    "invocation failed"
                );
                InvocationResult::failure(&e)
            }
        }
    }
}
