//! Storage notification decoding.
//!
//! The handler is driven by object-created notifications shaped like:
//!
//! ```json
//! {"Records": [{"s3": {"bucket": {"name": "uploads"},
//!                      "object": {"key": "holiday+photos%2Fbeach.png"}}}]}
//! ```
//!
//! Only the fields the transcoder needs are modeled; everything else in a
//! real notification is ignored. One invocation handles one source object,
//! so only the first record is used.

use crate::naming::decode_object_key;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Malformed notification: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Notification contains no records")]
    NoRecords,
    #[error("Notification record has an empty {0}")]
    Empty(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntity {
    /// Form-encoded object key, exactly as delivered.
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// The source object one invocation processes, with its key decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub bucket_name: String,
    pub object_key: String,
}

impl TriggerRecord {
    pub fn new(bucket_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
        }
    }
}

impl EventNotification {
    pub fn from_json(json: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode the first record into a [`TriggerRecord`].
    pub fn trigger(&self) -> Result<TriggerRecord, EventError> {
        let record = self.records.first().ok_or(EventError::NoRecords)?;
        if self.records.len() > 1 {
            tracing::warn!(
                records = self.records.len(),
                "notification carries multiple records; only the first is processed"
            );
        }

        let entity = &record.s3;
        if entity.bucket.name.is_empty() {
            return Err(EventError::Empty("bucket name"));
        }
        let object_key = decode_object_key(&entity.object.key);
        if object_key.is_empty() {
            return Err(EventError::Empty("object key"));
        }
        Ok(TriggerRecord {
            bucket_name: entity.bucket.name.clone(),
            object_key,
        })
    }
}
