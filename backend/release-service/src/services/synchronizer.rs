//! Mirror synchronisation of a content tree into the origin bucket

use crate::error::{ReleaseError, Result};
use crate::models::{
    FailedOperation, SyncOperation, SyncOptions, SyncPlan, SyncReport, UploadedObject,
};
use crate::services::content::ContentRoot;
use crate::services::remote::call_storage;
use resilience::ServiceConfig;
use s3_utils::{ObjectStore, PutRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Cooperative cancellation shared between a run and whoever may stop it
///
/// Checked before the plan is applied and between object operations; an
/// operation already in flight always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reconciles a local content tree against the remote object store
#[derive(Clone)]
pub struct ContentSynchronizer {
    store: Arc<dyn ObjectStore>,
    config: ServiceConfig,
}

impl ContentSynchronizer {
    pub fn new(store: Arc<dyn ObjectStore>, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Diff the local tree against the current remote listing
    pub async fn plan(&self, root: &ContentRoot, options: &SyncOptions) -> Result<SyncPlan> {
        let local = root.scan()?;
        let bucket = self.store.bucket().to_string();

        call_storage(&self.config, "s3:ListBucket", &bucket, || self.store.head_bucket()).await?;
        let remote =
            call_storage(&self.config, "s3:ListBucket", &bucket, || self.store.list_objects())
                .await?;

        let plan = SyncPlan::compute(local, &remote, options);
        info!(
            bucket = %bucket,
            upload = plan.to_upload.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged.len(),
            "Computed sync plan"
        );
        Ok(plan)
    }

    /// Apply `plan`: uploads first, then deletes, stopping at the first failure
    ///
    /// A failed or cancelled run reports every operation that completed; those
    /// objects are live and are not rolled back.
    pub async fn apply(
        &self,
        plan: SyncPlan,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(plan.unchanged.len());
        let bucket = self.store.bucket().to_string();

        for (path, object) in plan.to_upload {
            if cancel.is_cancelled() {
                return Err(cancelled(report));
            }

            let request = PutRequest {
                key: path.clone(),
                body: object.body,
                content_type: object.content_type,
                cache_control: options.cache_control.clone(),
            };
            let resource = format!("{}/{}", bucket, path);

            match call_storage(&self.config, "s3:PutObject", &resource, || {
                self.store.put_object(request.clone())
            })
            .await
            {
                Ok(outcome) => {
                    debug!(path = %path, version_id = ?outcome.version_id, "Uploaded object");
                    report.uploaded.push(UploadedObject {
                        path,
                        version_id: outcome.version_id,
                    });
                }
                Err(err) => return Err(aborted(report, path, SyncOperation::Upload, err.into())),
            }
        }

        for path in plan.to_delete {
            if cancel.is_cancelled() {
                return Err(cancelled(report));
            }

            let resource = format!("{}/{}", bucket, path);
            match call_storage(&self.config, "s3:DeleteObject", &resource, || {
                self.store.delete_object(&path)
            })
            .await
            {
                Ok(marker) => {
                    debug!(path = %path, delete_marker = ?marker, "Deleted object");
                    report.deleted.push(path);
                }
                Err(err) => return Err(aborted(report, path, SyncOperation::Delete, err.into())),
            }
        }

        info!(
            bucket = %bucket,
            uploaded = report.uploaded.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged,
            "Sync complete"
        );
        Ok(report)
    }

    /// Plan and apply in one call
    pub async fn sync(
        &self,
        root: &ContentRoot,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let plan = self.plan(root, options).await?;
        self.apply(plan, options, cancel).await
    }
}

fn cancelled(report: SyncReport) -> ReleaseError {
    info!(
        completed = report.completed_operations(),
        "Sync cancelled at operation boundary"
    );
    ReleaseError::Cancelled { report }
}

fn aborted(
    mut report: SyncReport,
    path: String,
    operation: SyncOperation,
    source: ReleaseError,
) -> ReleaseError {
    error!(
        path = %path,
        %operation,
        action = source.denied_action().unwrap_or("-"),
        completed = report.completed_operations(),
        error = %source,
        "Sync aborted"
    );
    report.failed = Some(FailedOperation {
        path: path.clone(),
        operation,
        error: source.to_string(),
    });
    ReleaseError::SyncAborted {
        report,
        path,
        operation,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentObject;
    use resilience::{RetryConfig, TimeoutConfig};
    use s3_utils::{InMemoryObjectStore, RemoteObject, StorageError};
    use std::time::Duration;

    fn quick() -> ServiceConfig {
        ServiceConfig {
            timeout: TimeoutConfig {
                duration: Duration::from_secs(5),
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        }
    }

    fn plan_for(local: Vec<ContentObject>, remote: &[RemoteObject]) -> SyncPlan {
        SyncPlan::compute(local, remote, &SyncOptions::mirror())
    }

    #[tokio::test]
    async fn test_apply_uploads_then_deletes() {
        let store = Arc::new(InMemoryObjectStore::new("site"));
        store
            .put_object(PutRequest {
                key: "old.html".to_string(),
                body: b"old".to_vec(),
                content_type: "text/html".to_string(),
                cache_control: None,
            })
            .await
            .unwrap();
        let remote = store.list_objects().await.unwrap();

        let sync = ContentSynchronizer::new(store.clone(), quick());
        let plan = plan_for(vec![ContentObject::new("index.html", b"new".to_vec())], &remote);
        let report = sync
            .apply(plan, &SyncOptions::mirror(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.deleted, vec!["old.html".to_string()]);
        assert_eq!(store.snapshot().keys().collect::<Vec<_>>(), vec!["index.html"]);
        assert_eq!(
            store.content_type("index.html").as_deref(),
            Some("text/html; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn test_failure_reports_completed_operations() {
        let store = Arc::new(InMemoryObjectStore::new("site"));
        store.fail_next(
            "b.css",
            StorageError::AccessDenied {
                action: "s3:PutObject".to_string(),
                resource: "site/b.css".to_string(),
            },
        );

        let sync = ContentSynchronizer::new(store.clone(), quick());
        let plan = plan_for(
            vec![
                ContentObject::new("a.css", b"a".to_vec()),
                ContentObject::new("b.css", b"b".to_vec()),
                ContentObject::new("c.css", b"c".to_vec()),
            ],
            &[],
        );

        let err = sync
            .apply(plan, &SyncOptions::mirror(), &CancelFlag::new())
            .await
            .unwrap_err();

        assert_eq!(err.denied_action(), Some("s3:PutObject"));
        let report = err.partial_report().unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.uploaded[0].path, "a.css");
        assert_eq!(report.failed.as_ref().unwrap().path, "b.css");
        assert!(!store.snapshot().contains_key("c.css"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(InMemoryObjectStore::new("site"));
        store.fail_next(
            "a.css",
            StorageError::transient("s3:PutObject", "site/a.css", "connection reset"),
        );

        let sync = ContentSynchronizer::new(store.clone(), quick());
        let plan = plan_for(vec![ContentObject::new("a.css", b"a".to_vec())], &[]);
        let report = sync
            .apply(plan, &SyncOptions::mirror(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_apply_has_no_side_effects() {
        let store = Arc::new(InMemoryObjectStore::new("site"));
        let sync = ContentSynchronizer::new(store.clone(), quick());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let plan = plan_for(vec![ContentObject::new("a.css", b"a".to_vec())], &[]);
        let err = sync
            .apply(plan, &SyncOptions::mirror(), &cancel)
            .await
            .unwrap_err();

        match err {
            ReleaseError::Cancelled { report } => assert_eq!(report.completed_operations(), 0),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.put_count(), 0);
    }
}
