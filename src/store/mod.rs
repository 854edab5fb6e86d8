//! Object storage abstraction.
//!
//! The transcoder only ever needs two capabilities from storage: read one
//! object and write one object. [`ObjectStore`] is exactly that, so the core
//! can run against a local directory tree ([`FileSystemStore`]) or an
//! in-process map ([`MemoryStore`]) with no network dependency.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod filesystem;
mod memory;

pub use filesystem::{FileSystemStore, ObjectMeta};
pub use memory::{MemoryStore, StoredObject};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("Access denied: {bucket}/{key}")]
    Access { bucket: String, key: String },
    #[error("Invalid {what} {value:?}: {reason}")]
    InvalidName {
        what: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify an IO failure on `path` that backs `bucket/key`.
    pub(crate) fn from_io(bucket: &str, key: &str, path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            io::ErrorKind::PermissionDenied => Self::Access {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => Self::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Narrow read/write capability over a bucketed object store.
///
/// `Sync` so one store can be shared by every rayon worker of an invocation.
/// Writes are create-or-overwrite with last-write-wins semantics.
pub trait ObjectStore: Sync {
    /// Read the full body of `bucket/key`.
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite `bucket/key`, tagging it with `content_type`.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Whether `bucket/key` exists. The default reads the object; stores
    /// with a cheaper metadata lookup should override it.
    fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.get(bucket, key) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(bucket, key)
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError> {
        (**self).put(bucket, key, body, content_type)
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        (**self).exists(bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReadOnly(Vec<u8>);

    impl ObjectStore for ReadOnly {
        fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
            if key == "present" {
                Ok(self.0.clone())
            } else if key == "locked" {
                Err(StoreError::Access {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            } else {
                Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
        }

        fn put(&self, _: &str, _: &str, _: &[u8], _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".to_string()))
        }
    }

    #[test]
    fn default_exists_maps_not_found_to_false() {
        let store = ReadOnly(vec![1]);
        assert!(store.exists("b", "present").unwrap());
        assert!(!store.exists("b", "missing").unwrap());
    }

    #[test]
    fn default_exists_propagates_other_errors() {
        let store = ReadOnly(vec![1]);
        assert!(matches!(
            store.exists("b", "locked"),
            Err(StoreError::Access { .. })
        ));
    }

    #[test]
    fn io_errors_are_classified() {
        let not_found = StoreError::from_io(
            "b",
            "k",
            PathBuf::from("/x"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(not_found.is_not_found());

        let denied = StoreError::from_io(
            "b",
            "k",
            PathBuf::from("/x"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(denied, StoreError::Access { .. }));

        let other = StoreError::from_io(
            "b",
            "k",
            PathBuf::from("/x"),
            io::Error::other("disk on fire"),
        );
        assert!(matches!(other, StoreError::Io { .. }));
    }
}
