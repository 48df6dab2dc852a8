//! Read side of the bucket's version history, used only by rollback

use crate::error::{ReleaseError, Result};
use crate::services::remote::call_storage;
use resilience::ServiceConfig;
use s3_utils::{ObjectStore, ObjectVersion, PutOutcome};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct VersionLedger {
    store: Arc<dyn ObjectStore>,
    config: ServiceConfig,
}

impl VersionLedger {
    pub fn new(store: Arc<dyn ObjectStore>, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Version history of a viewer path (`/index.html`) or object key, newest first
    pub async fn versions(&self, path: &str) -> Result<Vec<ObjectVersion>> {
        let key = object_key(path)?;
        let resource = format!("{}/{}", self.store.bucket(), key);

        Ok(call_storage(&self.config, "s3:ListBucketVersions", &resource, || {
            self.store.list_object_versions(&key)
        })
        .await?)
    }

    /// Make `version_id` current again for `path`
    ///
    /// The restored version is written as a new current version, so the
    /// history keeps growing and the rollback itself can be rolled back.
    pub async fn restore(&self, path: &str, version_id: &str) -> Result<PutOutcome> {
        let key = object_key(path)?;
        let versions = self.versions(&key).await?;

        let target = versions
            .iter()
            .find(|v| v.version_id == version_id)
            .ok_or_else(|| {
                ReleaseError::Configuration(format!(
                    "version {} does not exist for {}",
                    version_id, key
                ))
            })?;
        if target.is_delete_marker {
            return Err(ReleaseError::Configuration(format!(
                "version {} of {} is a delete marker and cannot be restored",
                version_id, key
            )));
        }

        let resource = format!("{}/{}", self.store.bucket(), key);
        let outcome = call_storage(&self.config, "s3:GetObjectVersion", &resource, || {
            self.store.restore_version(&key, version_id)
        })
        .await?;

        info!(
            path = %key,
            restored_from = %version_id,
            new_version_id = ?outcome.version_id,
            "Restored object version"
        );
        Ok(outcome)
    }
}

/// Object key for a viewer path: leading slashes stripped, must name a file
pub fn object_key(path: &str) -> Result<String> {
    let key = path.trim_start_matches('/');
    if key.is_empty() || key.ends_with('/') {
        return Err(ReleaseError::Configuration(format!(
            "'{}' does not name an object",
            path
        )));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::RetryConfig;
    use s3_utils::{InMemoryObjectStore, PutRequest};

    fn ledger(store: Arc<InMemoryObjectStore>) -> VersionLedger {
        let mut config = resilience::object_storage_config();
        config.retry = RetryConfig::no_retry();
        VersionLedger::new(store, config)
    }

    async fn put(store: &InMemoryObjectStore, key: &str, body: &[u8]) -> String {
        store
            .put_object(PutRequest {
                key: key.to_string(),
                body: body.to_vec(),
                content_type: "text/html; charset=utf-8".to_string(),
                cache_control: None,
            })
            .await
            .unwrap()
            .version_id
            .unwrap()
    }

    #[tokio::test]
    async fn test_restore_by_viewer_path() {
        let store = Arc::new(InMemoryObjectStore::new("site"));
        let old = put(&store, "index.html", b"<h1>v1</h1>").await;
        put(&store, "index.html", b"<h1>v2</h1>").await;

        let outcome = ledger(store.clone()).restore("/index.html", &old).await.unwrap();

        assert_eq!(store.snapshot()["index.html"], b"<h1>v1</h1>".to_vec());
        assert_eq!(outcome.version_id, store.current_version("index.html"));
    }

    #[tokio::test]
    async fn test_unknown_version_and_delete_marker_are_rejected() {
        let store = Arc::new(InMemoryObjectStore::new("site"));
        put(&store, "a.html", b"a").await;
        let marker = store.delete_object("a.html").await.unwrap().unwrap();
        let ledger = ledger(store);

        assert!(matches!(
            ledger.restore("a.html", "v99999999").await,
            Err(ReleaseError::Configuration(_))
        ));
        assert!(matches!(
            ledger.restore("a.html", &marker).await,
            Err(ReleaseError::Configuration(_))
        ));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("/index.html").unwrap(), "index.html");
        assert_eq!(object_key("blog/post.html").unwrap(), "blog/post.html");
        assert!(object_key("/").is_err());
        assert!(object_key("/blog/").is_err());
    }
}
