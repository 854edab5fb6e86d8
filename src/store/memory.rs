//! In-process object store.
//!
//! Holds objects in a map and counts calls, which makes it the fake of choice
//! for exercising the handler without touching disk: tests assert on
//! [`put_count`](MemoryStore::put_count) to prove that a failed invocation
//! wrote nothing.

use super::{ObjectStore, StoreError};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One stored object body with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    failing_keys: Mutex<HashSet<String>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object without counting it as a `put`.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>, content_type: &str) {
        self.objects().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Make every subsequent `put` to `key` (any bucket) fail.
    pub fn fail_puts_to(&self, key: &str) {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys present in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Number of `put` calls made, including failed ones.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.object(bucket, key)
            .map(|object| object.body)
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key);
        if failing {
            return Err(StoreError::Unavailable(format!(
                "injected failure writing {bucket}/{key}"
            )));
        }
        self.insert(bucket, key, body, content_type);
        Ok(())
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.object(bucket, key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_count_calls() {
        let store = MemoryStore::new();
        store.put("out", "a.jpg", b"x", "image/jpeg").unwrap();
        assert_eq!(store.get("out", "a.jpg").unwrap(), b"x");
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.get_count(), 1);
    }

    #[test]
    fn insert_is_not_counted() {
        let store = MemoryStore::new();
        store.insert("in", "photo.png", vec![1, 2, 3], "image/png");
        assert_eq!(store.put_count(), 0);
        assert_eq!(store.object("in", "photo.png").unwrap().body, vec![1, 2, 3]);
    }

    #[test]
    fn buckets_are_separate() {
        let store = MemoryStore::new();
        store.insert("in", "k", b"a".to_vec(), "image/png");
        assert!(store.get("out", "k").unwrap_err().is_not_found());
        assert_eq!(store.keys("in"), vec!["k"]);
        assert!(store.keys("out").is_empty());
    }

    #[test]
    fn injected_failure_counts_but_does_not_store() {
        let store = MemoryStore::new();
        store.fail_puts_to("720p/a.webp");

        let err = store
            .put("out", "720p/a.webp", b"x", "image/webp")
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.put_count(), 1);
        assert!(store.object("out", "720p/a.webp").is_none());
    }

    #[test]
    fn put_records_content_type() {
        let store = MemoryStore::new();
        store.put("out", "k.webp", b"x", "image/webp").unwrap();
        assert_eq!(store.object("out", "k.webp").unwrap().content_type, "image/webp");
    }
}
