//! Versioned in-memory object store
//!
//! Mirrors the behaviour of a versioning-enabled bucket: every put appends a
//! version, every delete appends a delete marker, and the newest entry for a
//! key is the only current one. Used by tests and local dry runs.

use crate::error::StorageError;
use crate::store::{content_etag, ObjectStore, ObjectVersion, PutOutcome, PutRequest, RemoteObject};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct StoredVersion {
    version_id: String,
    /// `None` marks a delete marker
    body: Option<Vec<u8>>,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

impl StoredVersion {
    fn etag(&self) -> Option<String> {
        self.body.as_deref().map(content_etag)
    }
}

/// In-memory stand-in for a versioned S3 bucket
pub struct InMemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<StoredVersion>>>,
    failures: Mutex<HashMap<String, StorageError>>,
    next_version: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            puts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Make the next put/delete of `key` fail with `error` (one-shot)
    pub fn fail_next(&self, key: impl Into<String>, error: StorageError) {
        self.failures.lock().insert(key.into(), error);
    }

    /// Current contents keyed by object key
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects
            .lock()
            .iter()
            .filter_map(|(key, versions)| {
                versions
                    .last()
                    .and_then(|v| v.body.clone())
                    .map(|body| (key.clone(), body))
            })
            .collect()
    }

    /// Version id currently live for `key`
    pub fn current_version(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(key)
            .and_then(|versions| versions.last())
            .filter(|v| v.body.is_some())
            .map(|v| v.version_id.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(key)
            .and_then(|versions| versions.last())
            .and_then(|v| v.content_type.clone())
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    fn take_failure(&self, key: &str) -> Result<(), StorageError> {
        match self.failures.lock().remove(key) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn allocate_version(&self) -> String {
        format!("v{:08}", self.next_version.fetch_add(1, Ordering::SeqCst))
    }

    fn append(&self, key: &str, body: Option<Vec<u8>>, content_type: Option<String>) -> String {
        let version_id = self.allocate_version();
        self.objects
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(StoredVersion {
                version_id: version_id.clone(),
                body,
                content_type,
                last_modified: Utc::now(),
            });
        version_id
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StorageError> {
        tokio::task::yield_now().await;

        Ok(self
            .objects
            .lock()
            .iter()
            .filter_map(|(key, versions)| {
                let current = versions.last()?;
                let body = current.body.as_ref()?;
                Some(RemoteObject {
                    key: key.clone(),
                    etag: current.etag(),
                    size: body.len() as u64,
                    last_modified: Some(current.last_modified),
                })
            })
            .collect())
    }

    async fn put_object(&self, request: PutRequest) -> Result<PutOutcome, StorageError> {
        // Yield so concurrent writers can interleave the way real network calls do
        tokio::task::yield_now().await;
        self.take_failure(&request.key)?;

        let etag = content_etag(&request.body);
        let version_id = self.append(&request.key, Some(request.body), Some(request.content_type));
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(PutOutcome {
            version_id: Some(version_id),
            etag: Some(etag),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        tokio::task::yield_now().await;
        self.take_failure(key)?;

        let version_id = self.append(key, None, None);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(version_id))
    }

    async fn list_object_versions(&self, key: &str) -> Result<Vec<ObjectVersion>, StorageError> {
        let objects = self.objects.lock();
        let versions = match objects.get(key) {
            Some(versions) => versions,
            None => return Ok(Vec::new()),
        };
        let latest = versions.len().saturating_sub(1);

        Ok(versions
            .iter()
            .enumerate()
            .rev()
            .map(|(idx, v)| ObjectVersion {
                key: key.to_string(),
                version_id: v.version_id.clone(),
                last_modified: Some(v.last_modified),
                is_latest: idx == latest,
                is_delete_marker: v.body.is_none(),
                etag: v.etag(),
            })
            .collect())
    }

    async fn restore_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> Result<PutOutcome, StorageError> {
        let (body, content_type) = {
            let objects = self.objects.lock();
            let source = objects
                .get(key)
                .and_then(|versions| versions.iter().find(|v| v.version_id == version_id))
                .ok_or_else(|| StorageError::NotFound {
                    key: format!("{}?versionId={}", key, version_id),
                })?;
            let body = source.body.clone().ok_or_else(|| StorageError::Service {
                action: "s3:GetObjectVersion".to_string(),
                resource: key.to_string(),
                message: "cannot restore a delete marker".to_string(),
            })?;
            (body, source.content_type.clone())
        };

        let etag = content_etag(&body);
        let new_version = self.append(key, Some(body), content_type);

        Ok(PutOutcome {
            version_id: Some(new_version),
            etag: Some(etag),
        })
    }
}
