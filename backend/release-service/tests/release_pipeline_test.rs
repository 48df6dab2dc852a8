mod common;

use async_trait::async_trait;
use common::*;
use release_service::models::{InvalidationOutcome, ReleaseOutcome};
use release_service::services::{
    CancelFlag, InvalidationError, ReleasePipeline, ReleaseTarget, TargetLocks,
};
use release_service::{FailureCategory, ReleaseError};
use s3_utils::{
    InMemoryObjectStore, ObjectStore, ObjectVersion, PutOutcome, PutRequest, RemoteObject,
    StorageError,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::test]
async fn test_release_mirrors_content_tree() {
    let harness = Harness::new();
    harness.write_tree(
        "public",
        &[
            ("index.html", "<h1>home</h1>"),
            ("about.html", "<h1>about</h1>"),
            ("css/site.css", "body{}"),
        ],
    );
    let pipeline = harness.pipeline(pipeline_grant());
    pipeline.run(&request(), &CancelFlag::new()).await.unwrap();
    let about_version = harness.store.current_version("about.html");

    harness.write_tree(
        "public",
        &[
            ("index.html", "<h1>home v2</h1>"),
            ("about.html", "<h1>about</h1>"),
            ("blog/index.html", "<h1>blog</h1>"),
        ],
    );
    let report = pipeline.run(&request(), &CancelFlag::new()).await.unwrap();

    assert_eq!(
        harness.store.snapshot(),
        tree(&[
            ("about.html", "<h1>about</h1>"),
            ("blog/index.html", "<h1>blog</h1>"),
            ("index.html", "<h1>home v2</h1>"),
        ])
    );
    // Unchanged objects are not rewritten
    assert_eq!(harness.store.current_version("about.html"), about_version);
    assert_eq!(report.sync.unchanged, 1);
    assert_eq!(report.sync.deleted, vec!["css/site.css".to_string()]);
    assert_eq!(
        harness.store.content_type("css/site.css"),
        None,
        "deleted object has no current content type"
    );
    assert!(report.is_fresh());

    match &report.invalidation {
        InvalidationOutcome::Submitted { paths, .. } => assert_eq!(
            paths,
            &vec![
                "/".to_string(),
                "/blog/".to_string(),
                "/blog/index.html".to_string(),
                "/css/site.css".to_string(),
                "/index.html".to_string(),
            ]
        ),
        other => panic!("unexpected invalidation: {other:?}"),
    }
}

#[tokio::test]
async fn test_second_run_without_changes_is_a_no_op() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "<h1>home</h1>"), ("a.css", "a")]);
    let pipeline = harness.pipeline(pipeline_grant());

    pipeline.run(&request(), &CancelFlag::new()).await.unwrap();
    let puts = harness.store.put_count();

    let report = pipeline.run(&request(), &CancelFlag::new()).await.unwrap();

    assert_eq!(report.sync.completed_operations(), 0);
    assert_eq!(report.sync.unchanged, 2);
    assert_eq!(report.invalidation, InvalidationOutcome::NotNeeded);
    assert_eq!(harness.store.put_count(), puts);
    assert_eq!(harness.store.delete_count(), 0);
    assert_eq!(harness.edge.requests().len(), 1);
}

#[tokio::test]
async fn test_rollback_restores_byte_identical_content() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "<h1>original</h1>")]);
    harness
        .pipeline(pipeline_grant())
        .run(&request(), &CancelFlag::new())
        .await
        .unwrap();
    let before = harness.store.snapshot()["index.html"].clone();

    harness.write_tree("public", &[("index.html", "<h1>broken</h1>")]);
    harness
        .pipeline(pipeline_grant())
        .run(&request(), &CancelFlag::new())
        .await
        .unwrap();

    let operator = harness.pipeline(operator_grant());
    let versions = operator.versions("/index.html").await.unwrap();
    assert_eq!(versions.len(), 2);
    assert!(versions[0].is_latest);

    let report = operator
        .rollback("/index.html", &versions[1].version_id)
        .await
        .unwrap();

    assert_eq!(harness.store.snapshot()["index.html"], before);
    assert_eq!(report.path, "index.html");
    assert_eq!(report.new_version_id, harness.store.current_version("index.html"));
    assert!(matches!(
        report.invalidation,
        InvalidationOutcome::Submitted { ref paths, .. }
            if paths == &vec!["/".to_string(), "/index.html".to_string()]
    ));
}

#[tokio::test]
async fn test_pipeline_principal_cannot_read_versions() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "x")]);
    let pipeline = harness.pipeline(pipeline_grant());
    pipeline.run(&request(), &CancelFlag::new()).await.unwrap();

    let err = pipeline.rollback("/index.html", "v00000001").await.unwrap_err();

    assert_eq!(err.category(), FailureCategory::Permission);
    assert_eq!(err.denied_action(), Some("s3:ListBucketVersions"));

    let err = pipeline.invalidation_status("I000000000001").await.unwrap_err();
    assert_eq!(err.denied_action(), Some("cloudfront:GetInvalidation"));
}

#[tokio::test]
async fn test_storage_denial_aborts_with_partial_report() {
    let harness = Harness::new();
    harness.write_tree("public", &[("a.html", "a"), ("b.html", "b"), ("c.html", "c")]);
    harness.store.fail_next(
        "b.html",
        StorageError::AccessDenied {
            action: "s3:PutObject".to_string(),
            resource: format!("arn:aws:s3:::{}/b.html", BUCKET),
        },
    );

    let err = harness
        .pipeline(pipeline_grant())
        .run(&request(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert_eq!(err.category(), FailureCategory::Permission);
    assert_eq!(err.denied_action(), Some("s3:PutObject"));
    let partial = err.partial_report().unwrap();
    assert_eq!(partial.uploaded.len(), 1);
    assert_eq!(partial.failed.as_ref().unwrap().path, "b.html");
    // Nothing is invalidated for an aborted sync
    assert!(harness.edge.requests().is_empty());
}

#[tokio::test]
async fn test_failed_invalidation_is_degraded_success() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "<h1>home</h1>")]);
    harness.edge.fail_with(InvalidationError::Transient {
        action: "cloudfront:CreateInvalidation".to_string(),
        message: "Throttling: Rate exceeded".to_string(),
    });

    let report = harness
        .pipeline(pipeline_grant())
        .run(&request(), &CancelFlag::new())
        .await
        .unwrap();

    assert!(matches!(report.outcome, ReleaseOutcome::PublishedNotFresh { .. }));
    assert!(report.invalidation_id().is_none());
    assert_eq!(harness.store.snapshot(), tree(&[("index.html", "<h1>home</h1>")]));

    // Retrying the invalidation alone refreshes the edge
    harness.edge.recover();
    let id = harness
        .pipeline(pipeline_grant())
        .invalidate(vec!["/*".to_string()])
        .await
        .unwrap();
    assert!(!id.is_empty());
}

#[tokio::test]
async fn test_overlapping_runs_leave_one_complete_tree() {
    let harness = Harness::new();
    let tree_a = [("index.html", "A"), ("a-only.html", "A"), ("shared.css", "A")];
    let tree_b = [("index.html", "B"), ("b-only.html", "B"), ("shared.css", "B")];
    harness.write_tree("public-a", &tree_a);
    harness.write_tree("public-b", &tree_b);

    let run_a = harness.pipeline_for(Path::new("public-a"), pipeline_grant());
    let run_b = harness.pipeline_for(Path::new("public-b"), pipeline_grant());
    let (req_a, req_b) = (request(), request());
    let (cancel_a, cancel_b) = (CancelFlag::new(), CancelFlag::new());

    let (a, b) = tokio::join!(run_a.run(&req_a, &cancel_a), run_b.run(&req_b, &cancel_b));
    a.unwrap();
    b.unwrap();

    let remote = harness.store.snapshot();
    assert!(
        remote == tree(&tree_a) || remote == tree(&tree_b),
        "remote is an interleaving of both trees: {:?}",
        remote.keys().collect::<Vec<_>>()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_runs_with_separate_lock_registries_share_the_lock_file() {
    let harness = Harness::new();
    let lock_dir = tempfile::TempDir::new().unwrap();
    let tree_a = [("index.html", "A"), ("a-only.html", "A"), ("shared.css", "A")];
    let tree_b = [("index.html", "B"), ("b-only.html", "B"), ("shared.css", "B")];
    harness.write_tree("public-a", &tree_a);
    harness.write_tree("public-b", &tree_b);

    // One registry per pipeline, as two CLI processes would have
    let run_a = harness.pipeline_with_locks(
        Path::new("public-a"),
        pipeline_grant(),
        TargetLocks::new().with_lock_dir(lock_dir.path()),
    );
    let run_b = harness.pipeline_with_locks(
        Path::new("public-b"),
        pipeline_grant(),
        TargetLocks::new().with_lock_dir(lock_dir.path()),
    );
    let (req_a, req_b) = (request(), request());
    let (cancel_a, cancel_b) = (CancelFlag::new(), CancelFlag::new());

    let (a, b) = tokio::join!(run_a.run(&req_a, &cancel_a), run_b.run(&req_b, &cancel_b));
    a.unwrap();
    b.unwrap();

    let remote = harness.store.snapshot();
    assert!(remote == tree(&tree_a) || remote == tree(&tree_b));
    assert!(lock_dir.path().join(format!("{}.lock", BUCKET)).exists());
}

#[tokio::test]
async fn test_cancel_before_start_touches_nothing() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "x")]);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = harness
        .pipeline(pipeline_grant())
        .run(&request(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.category(), FailureCategory::Cancelled);
    assert_eq!(err.partial_report().unwrap().completed_operations(), 0);
    assert_eq!(harness.store.put_count(), 0);
    assert!(harness.edge.requests().is_empty());
}

/// Store that trips a cancel flag once the first upload has landed
struct CancelAfterFirstPut {
    inner: Arc<InMemoryObjectStore>,
    cancel: CancelFlag,
}

#[async_trait]
impl ObjectStore for CancelAfterFirstPut {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn head_bucket(&self) -> Result<(), StorageError> {
        self.inner.head_bucket().await
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StorageError> {
        self.inner.list_objects().await
    }

    async fn put_object(&self, request: PutRequest) -> Result<PutOutcome, StorageError> {
        let outcome = self.inner.put_object(request).await;
        self.cancel.cancel();
        outcome
    }

    async fn delete_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.delete_object(key).await
    }

    async fn list_object_versions(&self, key: &str) -> Result<Vec<ObjectVersion>, StorageError> {
        self.inner.list_object_versions(key).await
    }

    async fn restore_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> Result<PutOutcome, StorageError> {
        self.inner.restore_version(key, version_id).await
    }
}

#[tokio::test]
async fn test_cancel_during_apply_reports_completed_operations() {
    let harness = Harness::new();
    harness.write_tree("public", &[("a.html", "a"), ("b.html", "b"), ("c.html", "c")]);
    let cancel = CancelFlag::new();

    let store = Arc::new(CancelAfterFirstPut {
        inner: harness.store.clone(),
        cancel: cancel.clone(),
    });
    let pipeline = ReleasePipeline::new(
        ReleaseTarget {
            bucket: BUCKET.to_string(),
            distribution_id: DISTRIBUTION.to_string(),
            repo_root: harness.repo.path().to_path_buf(),
            content_dir: "public".into(),
        },
        store,
        harness.edge.clone(),
        pipeline_grant(),
        quick_options(),
    );

    let err = pipeline.run(&request(), &cancel).await.unwrap_err();

    match err {
        ReleaseError::Cancelled { report } => {
            assert_eq!(report.uploaded.len(), 1);
            assert_eq!(report.uploaded[0].path, "a.html");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The completed upload stays live
    assert_eq!(harness.store.snapshot(), tree(&[("a.html", "a")]));
}

#[tokio::test]
async fn test_repository_root_is_never_published() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "x")]);

    let err = harness
        .pipeline_for(Path::new("."), pipeline_grant())
        .run(&request(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert_eq!(err.category(), FailureCategory::Configuration);
    assert!(harness.store.snapshot().is_empty());
}

#[tokio::test]
async fn test_explicit_sync_can_keep_extraneous_objects() {
    let harness = Harness::new();
    harness.write_tree("public", &[("index.html", "x"), ("legacy.html", "old")]);
    let pipeline = harness.pipeline(pipeline_grant());
    pipeline.run(&request(), &CancelFlag::new()).await.unwrap();

    harness.write_tree("public", &[("index.html", "y")]);
    let report = pipeline
        .sync(
            Path::new("public"),
            &release_service::models::SyncOptions {
                delete_extraneous: false,
                cache_control: None,
            },
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(
        harness.store.snapshot(),
        tree(&[("index.html", "y"), ("legacy.html", "old")])
    );
}
