//! Release orchestration: lock, sync, invalidate

use crate::error::{ReleaseError, Result};
use crate::models::{
    InvalidationOutcome, ReleaseOutcome, ReleaseReport, ReleaseRequest, RollbackReport,
    SyncOptions, SyncReport,
};
use crate::services::content::ContentRoot;
use crate::services::credentials::{CredentialGrant, ScopedInvalidator, ScopedStore};
use crate::services::invalidator::{
    CacheInvalidator, EdgeInvalidator, InvalidationRequest, InvalidationScope, InvalidationStatus,
};
use crate::services::ledger::{object_key, VersionLedger};
use crate::services::locks::TargetLocks;
use crate::services::synchronizer::{CancelFlag, ContentSynchronizer};
use chrono::Utc;
use resilience::{cdn_control_config, object_storage_config, ServiceConfig};
use s3_utils::{ObjectStore, ObjectVersion};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Where a release publishes from and to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub bucket: String,
    pub distribution_id: String,
    pub repo_root: PathBuf,
    /// Content subdirectory, relative to `repo_root`
    pub content_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub storage: ServiceConfig,
    pub edge: ServiceConfig,
    pub scope: InvalidationScope,
    pub cache_control: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            storage: object_storage_config(),
            edge: cdn_control_config(),
            scope: InvalidationScope::default(),
            cache_control: None,
        }
    }
}

/// One release target with its collaborators, all calls scoped by `grant`
#[derive(Clone)]
pub struct ReleasePipeline {
    target: ReleaseTarget,
    synchronizer: ContentSynchronizer,
    invalidator: CacheInvalidator,
    ledger: VersionLedger,
    locks: TargetLocks,
    cache_control: Option<String>,
}

impl ReleasePipeline {
    pub fn new(
        target: ReleaseTarget,
        store: Arc<dyn ObjectStore>,
        edge: Arc<dyn EdgeInvalidator>,
        grant: CredentialGrant,
        options: PipelineOptions,
    ) -> Self {
        let grant = Arc::new(grant);
        let store: Arc<dyn ObjectStore> = Arc::new(ScopedStore::new(store, grant.clone()));
        let edge: Arc<dyn EdgeInvalidator> = Arc::new(ScopedInvalidator::new(edge, grant));

        Self {
            target,
            synchronizer: ContentSynchronizer::new(store.clone(), options.storage.clone()),
            invalidator: CacheInvalidator::new(edge, options.edge, options.scope),
            ledger: VersionLedger::new(store, options.storage),
            locks: TargetLocks::new(),
            cache_control: options.cache_control,
        }
    }

    /// Share a lock registry with other pipelines, or lock across processes
    pub fn with_locks(mut self, locks: TargetLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn target(&self) -> &ReleaseTarget {
        &self.target
    }

    /// Publish the content tree for `request` and invalidate what changed
    ///
    /// A failed invalidation does not fail the release; the report carries
    /// [`ReleaseOutcome::PublishedNotFresh`] instead.
    pub async fn run(&self, request: &ReleaseRequest, cancel: &CancelFlag) -> Result<ReleaseReport> {
        let span = info_span!(
            "release",
            run_id = %request.run_id,
            commit = %request.commit,
            branch = %request.branch,
            bucket = %self.target.bucket,
            distribution_id = %self.target.distribution_id,
        );

        self.run_inner(request, cancel).instrument(span).await
    }

    async fn run_inner(&self, request: &ReleaseRequest, cancel: &CancelFlag) -> Result<ReleaseReport> {
        let started_at = Utc::now();
        if cancel.is_cancelled() {
            return Err(ReleaseError::Cancelled {
                report: SyncReport::default(),
            });
        }

        let root = ContentRoot::resolve(&self.target.repo_root, &self.target.content_dir)?;
        let options = SyncOptions {
            delete_extraneous: true,
            cache_control: self.cache_control.clone(),
        };

        let _guard = self.locks.acquire(&self.target.bucket).await?;
        info!("Acquired target lock");

        // Planned under the lock so the listing reflects the previous run's result
        let plan = self.synchronizer.plan(&root, &options).await?;
        if cancel.is_cancelled() {
            info!("Release cancelled before applying plan");
            return Err(ReleaseError::Cancelled {
                report: SyncReport::default(),
            });
        }

        let sync = self.synchronizer.apply(plan, &options, cancel).await?;
        let invalidation = self
            .invalidator
            .invalidate_changes(
                &self.target.distribution_id,
                &sync.changed_paths(),
                &request.run_id.to_string(),
            )
            .await;

        let outcome = match &invalidation {
            InvalidationOutcome::Failed { reason, .. } => ReleaseOutcome::PublishedNotFresh {
                reason: reason.clone(),
            },
            _ => ReleaseOutcome::Published,
        };

        let report = ReleaseReport {
            run_id: request.run_id,
            commit: request.commit.clone(),
            branch: request.branch.clone(),
            bucket: self.target.bucket.clone(),
            started_at,
            finished_at: Utc::now(),
            sync,
            invalidation,
            outcome,
        };

        info!(
            uploaded = report.sync.uploaded.len(),
            deleted = report.sync.deleted.len(),
            unchanged = report.sync.unchanged,
            invalidation_id = report.invalidation_id().unwrap_or("-"),
            fresh = report.is_fresh(),
            "Release finished"
        );
        Ok(report)
    }

    /// Mirror an arbitrary content directory without invalidating
    pub async fn sync(
        &self,
        content_dir: &Path,
        options: &SyncOptions,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let root = ContentRoot::resolve(&self.target.repo_root, content_dir)?;
        let _guard = self.locks.acquire(&self.target.bucket).await?;
        self.synchronizer.sync(&root, options, cancel).await
    }

    /// Submit an invalidation for explicit viewer path patterns
    pub async fn invalidate(&self, paths: Vec<String>) -> Result<String> {
        if paths.is_empty() {
            return Err(ReleaseError::Configuration(
                "at least one path pattern is required".to_string(),
            ));
        }
        if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ReleaseError::Configuration(format!(
                "path pattern '{}' must start with '/'",
                bad
            )));
        }

        let request = InvalidationRequest::new(
            self.target.distribution_id.clone(),
            paths,
            Uuid::new_v4().to_string(),
        );
        self.invalidator.submit(&request).await
    }

    pub async fn invalidation_status(&self, invalidation_id: &str) -> Result<InvalidationStatus> {
        self.invalidator
            .status(&self.target.distribution_id, invalidation_id)
            .await
    }

    pub async fn versions(&self, path: &str) -> Result<Vec<ObjectVersion>> {
        self.ledger.versions(path).await
    }

    /// Restore `path` to `version_id` and invalidate it
    ///
    /// Runs under the target lock so it cannot interleave with a release.
    pub async fn rollback(&self, path: &str, version_id: &str) -> Result<RollbackReport> {
        let key = object_key(path)?;
        let _guard = self.locks.acquire(&self.target.bucket).await?;

        let restored = self.ledger.restore(&key, version_id).await?;
        let invalidation = self
            .invalidator
            .invalidate_changes(
                &self.target.distribution_id,
                &BTreeSet::from([key.clone()]),
                &format!("rollback-{}", Uuid::new_v4()),
            )
            .await;

        info!(
            bucket = %self.target.bucket,
            path = %key,
            restored_from = %version_id,
            "Rollback finished"
        );

        Ok(RollbackReport {
            path: key,
            restored_version_id: version_id.to_string(),
            new_version_id: restored.version_id,
            invalidation,
        })
    }
}
