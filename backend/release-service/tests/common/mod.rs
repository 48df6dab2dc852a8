#![allow(dead_code)]

use release_service::models::ReleaseRequest;
use release_service::services::{
    CredentialGrant, InvalidationScope, PipelineOptions, RecordingInvalidator, ReleasePipeline,
    ReleaseTarget, TargetLocks,
};
use resilience::{RetryConfig, ServiceConfig, TimeoutConfig};
use s3_utils::InMemoryObjectStore;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const BUCKET: &str = "asadalikhan.co.uk";
pub const DISTRIBUTION: &str = "E2QWRUHAPOMQZL";
pub const ACCOUNT: &str = "123456789012";
pub const COMMIT: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

pub fn quick_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(5),
        },
        retry: RetryConfig {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
            jitter: false,
        },
    }
}

pub fn quick_options() -> PipelineOptions {
    PipelineOptions {
        storage: quick_config(),
        edge: quick_config(),
        scope: InvalidationScope::PerPath,
        cache_control: Some("public, max-age=300".to_string()),
    }
}

pub fn pipeline_grant() -> CredentialGrant {
    CredentialGrant::pipeline(BUCKET, DISTRIBUTION, Some(ACCOUNT.to_string()))
}

pub fn operator_grant() -> CredentialGrant {
    CredentialGrant::operator(BUCKET, DISTRIBUTION, Some(ACCOUNT.to_string()))
}

pub fn request() -> ReleaseRequest {
    ReleaseRequest::new(COMMIT, "main")
}

pub fn tree(files: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
    files
        .iter()
        .map(|(path, body)| (path.to_string(), body.as_bytes().to_vec()))
        .collect()
}

/// A repository checkout plus the in-memory origin and edge it publishes to
pub struct Harness {
    pub repo: TempDir,
    pub store: Arc<InMemoryObjectStore>,
    pub edge: Arc<RecordingInvalidator>,
    pub locks: TargetLocks,
}

impl Harness {
    pub fn new() -> Self {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("README.md"), "not published").unwrap();
        fs::write(repo.path().join(".env"), "AWS_SECRET_ACCESS_KEY=never-published").unwrap();

        Self {
            repo,
            store: Arc::new(InMemoryObjectStore::new(BUCKET)),
            edge: Arc::new(RecordingInvalidator::new()),
            locks: TargetLocks::new(),
        }
    }

    /// Replace the contents of `dir` with exactly `files`
    pub fn write_tree(&self, dir: &str, files: &[(&str, &str)]) {
        let root = self.repo.path().join(dir);
        if root.exists() {
            fs::remove_dir_all(&root).unwrap();
        }
        for (path, body) in files {
            let file = root.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, body).unwrap();
        }
    }

    pub fn pipeline(&self, grant: CredentialGrant) -> ReleasePipeline {
        self.pipeline_for(Path::new("public"), grant)
    }

    pub fn pipeline_for(&self, content_dir: &Path, grant: CredentialGrant) -> ReleasePipeline {
        self.pipeline_with_locks(content_dir, grant, self.locks.clone())
    }

    pub fn pipeline_with_locks(
        &self,
        content_dir: &Path,
        grant: CredentialGrant,
        locks: TargetLocks,
    ) -> ReleasePipeline {
        let target = ReleaseTarget {
            bucket: BUCKET.to_string(),
            distribution_id: DISTRIBUTION.to_string(),
            repo_root: self.repo.path().to_path_buf(),
            content_dir: content_dir.to_path_buf(),
        };

        ReleasePipeline::new(
            target,
            self.store.clone(),
            self.edge.clone(),
            grant,
            quick_options(),
        )
        .with_locks(locks)
    }
}
