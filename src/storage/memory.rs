//! In-memory [`ObjectStore`] for tests.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use super::{ObjectPage, ObjectStore, StorageError, StoredObject};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
}

/// Test double backed by a sorted map, with a configurable listing page
/// size and per-key delete failure injection.
pub struct MemoryObjectStore {
    page_size: usize,
    puts: AtomicUsize,
    objects: Mutex<BTreeMap<String, MemoryObject>>,
    fail_deletes: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            puts: AtomicUsize::new(0),
            objects: Mutex::new(BTreeMap::new()),
            fail_deletes: Mutex::new(HashSet::new()),
        }
    }

    /// Seed an object directly, bypassing `put_file`.
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            MemoryObject {
                data: data.to_vec(),
            },
        );
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Stored body for `key`, if present.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|o| o.data.clone())
    }

    /// Number of `put_file` calls made against this store.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every future delete of `key` fail.
    pub fn fail_delete(&self, key: &str) {
        self.fail_deletes.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let data = tokio::fs::read(path).await.map_err(|e| StorageError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.insert(key, &data);
        Ok(())
    }

    async fn list_page(&self, token: Option<String>) -> Result<ObjectPage, StorageError> {
        let objects = self.objects.lock().unwrap();
        let page: Vec<StoredObject> = objects
            .iter()
            .filter(|(key, _)| token.as_deref().is_none_or(|t| key.as_str() > t))
            .take(self.page_size)
            .map(|(key, object)| StoredObject {
                key: key.clone(),
                size: object.data.len() as i64,
                last_modified: Some(Utc::now()),
            })
            .collect();

        let next_token = match page.last() {
            Some(last) if objects.keys().any(|k| k.as_str() > last.key.as_str()) => {
                Some(last.key.clone())
            }
            _ => None,
        };

        Ok(ObjectPage {
            objects: page,
            next_token,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::Delete {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
