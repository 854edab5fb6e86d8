//! Directory-backed object store.
//!
//! Buckets are directories under a root, keys are relative paths inside
//! them. Object metadata lives in a parallel tree so no object key can
//! collide with a metadata file:
//!
//! ```text
//! <root>/
//! ├── uploads/                   # bucket
//! │   └── photo.png
//! ├── renditions/                # bucket
//! │   ├── 1080p/photo.jpg
//! │   └── 1080p/photo.webp
//! └── .meta/
//!     └── renditions/
//!         ├── 1080p/photo.jpg.json
//!         └── 1080p/photo.webp.json
//! ```
//!
//! Writes go to a temp file in the destination directory and are renamed
//! into place, so readers never observe a half-written object.

use super::{ObjectStore, StoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

const META_DIR: &str = ".meta";

/// Metadata recorded next to every object written through the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the object body.
    pub sha256: String,
}

pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// Create a store rooted at `root`. Directories are created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    fn validate_bucket(bucket: &str) -> Result<(), StoreError> {
        let reason = if bucket.is_empty() {
            Some("must not be empty")
        } else if bucket.starts_with('.') {
            Some("must not start with '.'")
        } else if bucket.contains(['/', '\\']) {
            Some("must not contain path separators")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(StoreError::InvalidName {
                what: "bucket",
                value: bucket.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Relative path for `key`, rejecting anything that would escape the
    /// bucket directory.
    fn key_path(key: &str) -> Result<PathBuf, StoreError> {
        let invalid = |reason| StoreError::InvalidName {
            what: "key",
            value: key.to_string(),
            reason,
        };
        if key.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if key.split('/').any(|segment| segment.is_empty()) {
            return Err(invalid("must not contain empty segments"));
        }
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(invalid("must not contain '.' or '..' segments"));
        }
        let path = PathBuf::from(key);
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(invalid("must be a plain relative path"));
        }
        Ok(path)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        Self::validate_bucket(bucket)?;
        Ok(self.root.join(bucket).join(Self::key_path(key)?))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        Self::validate_bucket(bucket)?;
        let mut path = self.root.join(META_DIR).join(bucket).join(Self::key_path(key)?);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".json");
        path.set_file_name(name);
        Ok(path)
    }

    /// Write `data` to `path` via a sibling temp file and rename.
    fn write_atomic(bucket: &str, key: &str, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let io_err = |p: &Path, e| StoreError::from_io(bucket, key, p.to_path_buf(), e);
        let parent = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_err(parent, e))?;
        tmp.write_all(data).map_err(|e| io_err(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| io_err(path, e.error))?;
        Ok(())
    }

    /// Metadata for an object written through this store.
    pub fn head(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StoreError> {
        let path = self.meta_path(bucket, key)?;
        let raw = fs::read(&path).map_err(|e| StoreError::from_io(bucket, key, path.clone(), e))?;
        serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Unavailable(format!("corrupt metadata at {}: {e}", path.display()))
        })
    }
}

impl ObjectStore for FileSystemStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).map_err(|e| StoreError::from_io(bucket, key, path, e))
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        Self::write_atomic(bucket, key, &path, body)?;

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size_bytes: body.len() as u64,
            sha256: Self::compute_hash(body),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StoreError::Unavailable(format!("metadata encode failed: {e}")))?;
        Self::write_atomic(bucket, key, &self.meta_path(bucket, key)?, &meta_json)?;

        tracing::trace!(bucket, key, content_type, size_bytes = body.len(), "object written");
        Ok(())
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.object_path(bucket, key)?.is_file())
    }
}
